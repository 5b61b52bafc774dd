//! Fleet v1 resources: units, machines and unit states.
//!
//! Every helper routes through the client's verb methods and returns the raw
//! response body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::Client;
use crate::connection::Connection;
use crate::error::{FleetError, FleetResult};
use crate::http::{Headers, Options};

/// Path prefix of the fleet v1 API.
pub const API_PREFIX: &str = "/fleet/v1";

/// Desired or current state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Inactive,
    Loaded,
    Launched,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Inactive => "inactive",
            UnitState::Loaded => "loaded",
            UnitState::Launched => "launched",
        }
    }
}

/// A single `[Section] Name=Value` line of a unit file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    pub section: String,
    pub name: String,
    pub value: String,
}

impl UnitOption {
    pub fn new(section: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Filters for `list_unit_states`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFilter {
    pub unit_name: Option<String>,
    pub machine_id: Option<String>,
}

impl StateFilter {
    pub fn unit(name: impl Into<String>) -> Self {
        Self {
            unit_name: Some(name.into()),
            machine_id: None,
        }
    }

    fn to_options(&self) -> Options {
        let mut options = Options::new();
        if let Some(name) = &self.unit_name {
            options.insert("unitName".to_string(), Value::String(name.clone()));
        }
        if let Some(id) = &self.machine_id {
            options.insert("machineID".to_string(), Value::String(id.clone()));
        }
        options
    }
}

/// Flatten a service definition of the form
/// `{"Section": {"Name": "value" | ["v1", "v2"]}}` into unit options.
///
/// Arrays produce one option per element, in order. Non-string scalars are
/// written as their JSON text.
pub fn service_definition(definition: &Options) -> FleetResult<Vec<UnitOption>> {
    let mut options = Vec::new();
    for (section, entries) in definition {
        let Value::Object(entries) = entries else {
            return Err(FleetError::InvalidOptions(format!(
                "section `{section}` must be an object"
            )));
        };
        for (name, value) in entries {
            match value {
                Value::Array(values) => options.extend(
                    values
                        .iter()
                        .map(|v| UnitOption::new(section.as_str(), name.as_str(), option_text(v))),
                ),
                other => options.push(UnitOption::new(section.as_str(), name.as_str(), option_text(other))),
            }
        }
    }
    Ok(options)
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unit_path(name: &str) -> String {
    format!("{API_PREFIX}/units/{}", urlencoding::encode(name))
}

fn into_options(value: Value) -> Options {
    match value {
        Value::Object(map) => map,
        _ => Options::new(),
    }
}

impl<C: Connection> Client<C> {
    /// One page of units; pass the previous page's `nextPageToken` to continue.
    pub fn list_units(&self, page_token: Option<&str>) -> FleetResult<String> {
        let mut options = Options::new();
        if let Some(token) = page_token {
            options.insert("nextPageToken".to_string(), Value::String(token.to_string()));
        }
        self.get(&format!("{API_PREFIX}/units"), options, Headers::new())
    }

    pub fn get_unit(&self, name: &str) -> FleetResult<String> {
        self.get(&unit_path(name), Options::new(), Headers::new())
    }

    /// Create a unit from its options with the given desired state.
    pub fn create_unit(
        &self,
        name: &str,
        options: &[UnitOption],
        desired: UnitState,
    ) -> FleetResult<String> {
        let body = json!({
            "name": name,
            "desiredState": desired,
            "options": options,
        });
        self.put(&unit_path(name), into_options(body), Headers::new())
    }

    pub fn set_unit_desired_state(&self, name: &str, state: UnitState) -> FleetResult<String> {
        let body = json!({ "desiredState": state });
        self.put(&unit_path(name), into_options(body), Headers::new())
    }

    pub fn delete_unit(&self, name: &str) -> FleetResult<String> {
        self.delete(&unit_path(name), Options::new(), Headers::new())
    }

    pub fn list_machines(&self) -> FleetResult<String> {
        self.get(&format!("{API_PREFIX}/machines"), Options::new(), Headers::new())
    }

    pub fn list_unit_states(&self, filter: &StateFilter) -> FleetResult<String> {
        self.get(&format!("{API_PREFIX}/state"), filter.to_options(), Headers::new())
    }

    // --- lifecycle ---

    /// Register a unit without scheduling it.
    pub fn submit(&self, name: &str, definition: &Options) -> FleetResult<String> {
        self.create_unit(name, &service_definition(definition)?, UnitState::Inactive)
    }

    /// Schedule a unit onto a machine. With a definition the unit is created
    /// loaded; without one an existing unit is moved to loaded.
    pub fn load(&self, name: &str, definition: Option<&Options>) -> FleetResult<String> {
        match definition {
            Some(definition) => {
                self.create_unit(name, &service_definition(definition)?, UnitState::Loaded)
            }
            None => self.set_unit_desired_state(name, UnitState::Loaded),
        }
    }

    pub fn start(&self, name: &str) -> FleetResult<String> {
        self.set_unit_desired_state(name, UnitState::Launched)
    }

    pub fn stop(&self, name: &str) -> FleetResult<String> {
        self.set_unit_desired_state(name, UnitState::Loaded)
    }

    pub fn unload(&self, name: &str) -> FleetResult<String> {
        self.set_unit_desired_state(name, UnitState::Inactive)
    }

    pub fn destroy(&self, name: &str) -> FleetResult<String> {
        self.delete_unit(name)
    }

    /// Unit states reported for `name`.
    pub fn status(&self, name: &str) -> FleetResult<String> {
        self.list_unit_states(&StateFilter::unit(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::error::TransportError;
    use crate::http::{RequestDescriptor, Response, Verb};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<RequestDescriptor>>>,
    }

    impl Recorder {
        fn last(&self) -> RequestDescriptor {
            self.sent.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Connection for Recorder {
        fn open(_config: &Configuration) -> FleetResult<Self> {
            Ok(Self::default())
        }

        fn send(&self, request: RequestDescriptor) -> Result<Response, TransportError> {
            self.sent.lock().unwrap().push(request);
            Ok(Response::ok("{}"))
        }
    }

    fn client() -> (Client<Recorder>, Recorder) {
        let recorder = Recorder::default();
        (Client::with_connection(Configuration::defaults(), recorder.clone()), recorder)
    }

    fn definition() -> Options {
        json!({
            "Unit": { "Description": "web" },
            "Service": { "ExecStart": "/usr/bin/web", "Environment": ["A=1", "B=2"] },
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn service_definition_flattens_sections() {
        let options = service_definition(&definition()).unwrap();
        assert!(options.contains(&UnitOption::new("Unit", "Description", "web")));
        assert!(options.contains(&UnitOption::new("Service", "ExecStart", "/usr/bin/web")));
        let env: Vec<_> = options.iter().filter(|o| o.name == "Environment").map(|o| o.value.as_str()).collect();
        assert_eq!(env, vec!["A=1", "B=2"]);
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn service_definition_rejects_non_object_section() {
        let bad = json!({ "Unit": "Description=web" }).as_object().cloned().unwrap();
        assert!(matches!(service_definition(&bad), Err(FleetError::InvalidOptions(_))));
    }

    #[test]
    fn service_definition_renders_scalars() {
        let def = json!({ "X-Fleet": { "Global": true } }).as_object().cloned().unwrap();
        assert_eq!(service_definition(&def).unwrap(), vec![UnitOption::new("X-Fleet", "Global", "true")]);
    }

    #[test]
    fn list_units_passes_page_token() {
        let (client, recorder) = client();
        client.list_units(None).unwrap();
        let sent = recorder.last();
        assert_eq!(sent.path(), "/fleet/v1/units");
        assert!(sent.params().is_none());

        client.list_units(Some("abc")).unwrap();
        assert_eq!(recorder.last().query_pairs(), vec![("nextPageToken".to_string(), "abc".to_string())]);
    }

    #[test]
    fn unit_names_are_escaped_in_paths() {
        let (client, recorder) = client();
        client.get_unit("web@1.service").unwrap();
        assert_eq!(recorder.last().path(), "/fleet/v1/units/web%401.service");
    }

    #[test]
    fn create_unit_puts_full_body() {
        let (client, recorder) = client();
        let options = vec![UnitOption::new("Service", "ExecStart", "/bin/true")];
        client.create_unit("a.service", &options, UnitState::Launched).unwrap();

        let sent = recorder.last();
        assert_eq!(sent.verb(), Verb::Put);
        assert_eq!(
            sent.body(),
            Some(&json!({
                "name": "a.service",
                "desiredState": "launched",
                "options": [{ "section": "Service", "name": "ExecStart", "value": "/bin/true" }],
            }))
        );
    }

    #[test]
    fn lifecycle_moves_desired_state() {
        let (client, recorder) = client();
        let cases: [(fn(&Client<Recorder>, &str) -> FleetResult<String>, &str); 3] = [
            (Client::<Recorder>::start, "launched"),
            (Client::<Recorder>::stop, "loaded"),
            (Client::<Recorder>::unload, "inactive"),
        ];
        for (op, state) in cases {
            op(&client, "a.service").unwrap();
            assert_eq!(recorder.last().body(), Some(&json!({ "desiredState": state })));
        }
    }

    #[test]
    fn submit_and_load_create_units() {
        let (client, recorder) = client();
        client.submit("a.service", &definition()).unwrap();
        assert_eq!(recorder.last().body().unwrap()["desiredState"], "inactive");

        client.load("a.service", Some(&definition())).unwrap();
        assert_eq!(recorder.last().body().unwrap()["desiredState"], "loaded");
        assert_eq!(recorder.last().body().unwrap()["options"].as_array().unwrap().len(), 4);

        client.load("a.service", None).unwrap();
        assert_eq!(recorder.last().body(), Some(&json!({ "desiredState": "loaded" })));
    }

    #[test]
    fn destroy_deletes_unit() {
        let (client, recorder) = client();
        client.destroy("a.service").unwrap();
        let sent = recorder.last();
        assert_eq!(sent.verb(), Verb::Delete);
        assert_eq!(sent.path(), "/fleet/v1/units/a.service");
    }

    #[test]
    fn status_filters_states_by_unit() {
        let (client, recorder) = client();
        client.status("a.service").unwrap();
        let sent = recorder.last();
        assert_eq!(sent.path(), "/fleet/v1/state");
        assert_eq!(sent.query_pairs(), vec![("unitName".to_string(), "a.service".to_string())]);
    }

    #[test]
    fn machine_filter_is_sent_as_machine_id() {
        let (client, recorder) = client();
        let filter = StateFilter {
            unit_name: None,
            machine_id: Some("m1".to_string()),
        };
        client.list_unit_states(&filter).unwrap();
        assert_eq!(recorder.last().query_pairs(), vec![("machineID".to_string(), "m1".to_string())]);

        client.list_machines().unwrap();
        assert_eq!(recorder.last().path(), "/fleet/v1/machines");
    }
}
