use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

const VALID_STATES: [&str; 3] = ["inactive", "loaded", "launched"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    pub section: String,
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub name: String,
    pub options: Vec<UnitOption>,
    pub desired_state: String,
    pub current_state: String,
    #[serde(rename = "machineID", default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(skip)]
    hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(rename = "primaryIP")]
    pub primary_ip: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStateEntry {
    pub name: String,
    pub hash: String,
    #[serde(rename = "machineID")]
    pub machine_id: String,
    pub systemd_load_state: String,
    pub systemd_active_state: String,
    pub systemd_sub_state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutUnit {
    #[serde(default)]
    pub name: Option<String>,
    pub desired_state: String,
    #[serde(default)]
    pub options: Vec<UnitOption>,
}

#[derive(Deserialize)]
pub struct StateQuery {
    #[serde(rename = "unitName")]
    pub unit_name: Option<String>,
    #[serde(rename = "machineID")]
    pub machine_id: Option<String>,
}

pub struct Cluster {
    units: BTreeMap<String, Unit>,
    machines: Vec<Machine>,
}

impl Cluster {
    fn seeded() -> Self {
        Self {
            units: BTreeMap::new(),
            machines: vec![Machine {
                id: Uuid::new_v4().simple().to_string(),
                primary_ip: "10.0.0.1".to_string(),
                metadata: BTreeMap::from([("region".to_string(), "local".to_string())]),
            }],
        }
    }

    /// Units are placed on the first machine as soon as they are wanted
    /// anywhere but inactive, and reach their desired state immediately.
    fn schedule(&self, unit: &mut Unit) {
        if unit.desired_state == "inactive" {
            unit.machine_id = None;
        } else if unit.machine_id.is_none() {
            unit.machine_id = self.machines.first().map(|m| m.id.clone());
        }
        unit.current_state = unit.desired_state.clone();
    }
}

pub type Db = Arc<RwLock<Cluster>>;

/// Paths served by `app`, as printed on startup.
pub const ROUTES: [&str; 5] = [
    "/fleet/v1/units",
    "/fleet/v1/units/{name}",
    "/fleet/v1/machines",
    "/fleet/v1/state",
    "/echo",
];

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Cluster::seeded()));
    Router::new()
        .route(ROUTES[0], get(list_units))
        .route(ROUTES[1], get(get_unit).put(put_unit).delete(delete_unit))
        .route(ROUTES[2], get(list_machines))
        .route(ROUTES[3], get(list_states))
        .route(ROUTES[4], any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn fleet_error(status: StatusCode, message: &str) -> Response {
    let body = json!({ "error": { "code": status.as_u16(), "message": message } });
    (status, Json(body)).into_response()
}

async fn list_units(State(db): State<Db>) -> Json<Value> {
    let cluster = db.read().await;
    let units: Vec<&Unit> = cluster.units.values().collect();
    Json(json!({ "units": units }))
}

async fn get_unit(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let cluster = db.read().await;
    match cluster.units.get(&name) {
        Some(unit) => Json(unit.clone()).into_response(),
        None => fleet_error(StatusCode::NOT_FOUND, "unit does not exist"),
    }
}

async fn put_unit(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<PutUnit>,
) -> Response {
    if !VALID_STATES.contains(&input.desired_state.as_str()) {
        return fleet_error(StatusCode::BAD_REQUEST, "invalid desiredState");
    }
    if input.name.as_deref().is_some_and(|body_name| body_name != name) {
        return fleet_error(StatusCode::BAD_REQUEST, "name in body does not match path");
    }

    let mut cluster = db.write().await;
    if let Some(mut unit) = cluster.units.get(&name).cloned() {
        if !input.options.is_empty() && input.options != unit.options {
            return fleet_error(StatusCode::CONFLICT, "unit options may not be changed");
        }
        unit.desired_state = input.desired_state;
        cluster.schedule(&mut unit);
        cluster.units.insert(name, unit);
        return StatusCode::NO_CONTENT.into_response();
    }

    if input.options.is_empty() {
        return fleet_error(StatusCode::CONFLICT, "unit does not exist and options field empty");
    }
    let mut unit = Unit {
        name: name.clone(),
        options: input.options,
        desired_state: input.desired_state,
        current_state: "inactive".to_string(),
        machine_id: None,
        hash: Uuid::new_v4().simple().to_string(),
    };
    cluster.schedule(&mut unit);
    cluster.units.insert(name, unit);
    StatusCode::CREATED.into_response()
}

async fn delete_unit(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let mut cluster = db.write().await;
    match cluster.units.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => fleet_error(StatusCode::NOT_FOUND, "unit does not exist"),
    }
}

async fn list_machines(State(db): State<Db>) -> Json<Value> {
    let cluster = db.read().await;
    Json(json!({ "machines": cluster.machines }))
}

async fn list_states(State(db): State<Db>, Query(filter): Query<StateQuery>) -> Json<Value> {
    let cluster = db.read().await;
    let states: Vec<UnitStateEntry> = cluster
        .units
        .values()
        .filter(|unit| filter.unit_name.as_ref().map_or(true, |name| *name == unit.name))
        .filter_map(|unit| {
            let machine_id = unit.machine_id.clone()?;
            if filter.machine_id.as_ref().is_some_and(|id| *id != machine_id) {
                return None;
            }
            let (active, sub) = match unit.current_state.as_str() {
                "launched" => ("active", "running"),
                _ => ("inactive", "dead"),
            };
            Some(UnitStateEntry {
                name: unit.name.clone(),
                hash: unit.hash.clone(),
                machine_id,
                systemd_load_state: "loaded".to_string(),
                systemd_active_state: active.to_string(),
                systemd_sub_state: sub.to_string(),
            })
        })
        .collect();
    Json(json!({ "states": states }))
}

/// Reflects the request back so clients can check what actually went out.
async fn echo(
    method: Method,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(json!({
        "method": method.as_str(),
        "query": query,
        "headers": headers,
        "body": body,
    }))
}
