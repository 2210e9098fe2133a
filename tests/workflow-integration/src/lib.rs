use std::net::SocketAddr;

use axum::Router;

pub mod harness;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn spawn_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

/// HTTP client that leaves redirects for the test to inspect.
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("reqwest client")
}

/// GET `url` and return the status code and `Location` header.
pub async fn follow_once(client: &reqwest::Client, url: &str) -> (u16, Option<String>) {
    let resp = client.get(url).send().await.expect("request");
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .map(|v| v.to_str().expect("ascii location").to_string());
    (resp.status().as_u16(), location)
}
