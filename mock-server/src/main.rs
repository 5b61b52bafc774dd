use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "49153".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("fleet mock listening on {addr}");
    for route in mock_server::ROUTES {
        println!("  {route}");
    }
    mock_server::run(listener).await
}
