//! `forged`: the execution orchestration process. Grounded on
//! `cloud-component-service/src/server.rs`'s `main`/`async_main` split
//! (`--dump-openapi-yaml` vs config load, tracing + prometheus/otel setup,
//! then a multi-thread runtime running every long-lived task), adapted here
//! from a `tokio::select!` over two spawned tasks to a `tokio::task::JoinSet`
//! the way `cloud-service/src/lib.rs::CloudService::run` structures it, since
//! this process has three loops (HTTP server, Scheduler, Health Loop) rather
//! than two.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use opentelemetry::global;
use opentelemetry_sdk::metrics::MeterProviderBuilder;
use poem::endpoint::PrometheusExporter;
use poem::listener::TcpListener;
use poem::middleware::Cors;
use poem::{EndpointExt, Route};
use tokio::task::JoinSet;
use tracing::{error, info};

use forge_common::config::ConfigLoader;
use forge_common::tracing_setup::init_tracing_with_default_env_filter;
use forge_core::api::make_open_api_service;
use forge_core::bootstrap::Services;
use forge_core::config::AppConfig;

fn main() -> Result<(), std::io::Error> {
    if std::env::args().any(|arg| arg == "--dump-openapi-yaml") {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()?.block_on(dump_openapi_yaml())
    } else if let Some(config) = config_loader().load_or_dump_config() {
        init_tracing_with_default_env_filter(&config.tracing);
        let prometheus = prometheus::Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(prometheus.clone())
            .build()
            .expect("prometheus exporter builds with a fresh registry");
        global::set_meter_provider(MeterProviderBuilder::default().with_reader(exporter).build());

        tokio::runtime::Builder::new_multi_thread().enable_all().build()?.block_on(async_main(config, prometheus))
    } else {
        Ok(())
    }
}

fn config_loader() -> ConfigLoader<AppConfig> {
    ConfigLoader::new(Path::new("./forge.toml"), "FORGE")
}

async fn dump_openapi_yaml() -> Result<(), std::io::Error> {
    let config = AppConfig::default();
    let services = Services::new(&config).await.map_err(|e| {
        error!("service init failed: {e}");
        std::io::Error::other(e)
    })?;
    let open_api_service = make_open_api_service(&services, &config);
    println!("{}", open_api_service.spec_yaml());
    Ok(())
}

async fn async_main(config: AppConfig, prometheus_registry: prometheus::Registry) -> Result<(), std::io::Error> {
    info!(http_port = config.http_port, "starting forged");

    let services = Services::new(&config).await.map_err(|e| {
        error!("service init failed: {e}");
        std::io::Error::other(e)
    })?;

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    let scheduler = services.scheduler(&config);
    tasks.spawn(async move {
        scheduler.run().await;
        Ok(())
    });

    let health_loop = services.health_loop(&config);
    tasks.spawn(async move {
        health_loop.run().await;
        Ok(())
    });

    let http_services = services.clone();
    let http_config = config.clone();
    tasks.spawn(async move {
        let api_service = make_open_api_service(&http_services, &http_config);
        let ui = api_service.swagger_ui();
        let spec = api_service.spec_endpoint_yaml();
        let metrics = PrometheusExporter::new(prometheus_registry);

        let cors = Cors::new().allow_origin_regex(&http_config.cors_origin_regex).allow_credentials(true);

        let app = Route::new()
            .nest("/", api_service)
            .nest("/docs", ui)
            .nest("/specs", spec)
            .nest("/metrics", metrics)
            .with(cors);

        poem::Server::new(TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, http_config.http_port)))
            .run(app)
            .await?;
        Ok(())
    });

    tokio::select! {
        result = tasks.join_next() => {
            if let Some(Ok(Err(e))) = result {
                error!(error = %e, "a background task exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
