/// Example: Session Restore
///
/// This example restores a session from a token persisted on disk, logs in
/// when there is nothing to restore, and issues one authenticated request.
///
/// Run against a server exposing `/oauth/token`, `/oauth/refresh` and `/oauth/me`:
/// RIEGEL_BASE_URL=http://localhost:8000/api/v1 RIEGEL_USER=ada RIEGEL_PASSWORD=secret \
///     RUST_LOG=riegel=debug cargo run --example session_restore
use riegel::prelude::*;

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("riegel=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    println!("=== Session Restore Example ===\n");

    let base_url = std::env::var("RIEGEL_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000/api/v1".to_string());
    let config = ClientConfig::new(base_url);

    // Tokens survive restarts in ~/.local/share/riegel-example/storage.json
    let storage = FileStorage::new("riegel-example").expect("Failed to create storage");
    let session = SessionManager::connect(&config, storage)
        .expect("Failed to create HTTP client")
        .with_navigator(|location: &str| println!("→ Redirect to {}", location));

    println!("Status before restore: {:?}", session.status());
    session.initialize().await;
    println!("Status after restore:  {:?}\n", session.status());

    if !session.is_authenticated() {
        let (Ok(user), Ok(password)) = (
            std::env::var("RIEGEL_USER"),
            std::env::var("RIEGEL_PASSWORD"),
        ) else {
            println!("No stored session. Set RIEGEL_USER and RIEGEL_PASSWORD to log in.");
            return;
        };

        println!("=== Logging In ===");
        match session.login(&Credentials::new(user, password)).await {
            Ok(profile) => println!("✓ Logged in as {}\n", profile.user_name),
            Err(e) => {
                println!("✗ {}", e.describe("Login failed"));
                return;
            }
        }
    }

    if let Some(user) = session.user() {
        println!("=== Profile ===");
        println!("  User name: {}", user.user_name);
        println!("  Name: {} {}", user.first_name, user.last_name);
        println!("  Email: {}", user.email);
        println!();
    }

    // Any request below recovers from an expired token transparently
    println!("=== Authenticated Request ===");
    match session.pipeline().send(ApiRequest::get(&config.endpoints.profile)).await {
        Ok(response) => println!("✓ {} {}", response.status, response.text()),
        Err(e) => println!("✗ {}", e.describe("Request failed")),
    }

    println!("\nStatus: {:?}", session.status());
}
