use actix_web::{web, App, HttpServer};
use clap::Parser;
use slotchat::cli::{commands::{Cli, Commands}, run_cli};
use slotchat::config::AppConfig;
use slotchat::db;
use slotchat::llm::ProviderFactory;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting AI Booking Agent server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let llm_provider = match ProviderFactory::create_default(&config) {
        Some(p) => p,
        None => {
            error!("Failed to initialize LLM provider '{}' from config", config.llm.provider);
            std::process::exit(1);
        }
    };

    let engine = slotchat::build_engine(&config, db_pool, llm_provider);

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(slotchat::api::routes::cors())
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(engine.clone()))
            .configure(slotchat::api::routes::configure)
            .configure(slotchat::api::websocket::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
