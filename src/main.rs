use anyhow::{bail, Context};
use flow::stubs::{LogNotificationSink, StaticAuthorizer};
use flow::{WorkflowEngine, WorkflowService, WorkflowStore};
use mold_api::{build_router, ServerConfig};
use mold_domain::{Mold, MoldRepository, PlantMold};
use mold_persistence::DieselWorkflowStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Servidor HTTP de workflows de moldes.
///
/// Uso:
/// - `moldflow-server`: aplica migraciones y sirve en `MOLDFLOW_BIND_ADDR`.
/// - `moldflow-server seed-mold <código> <empresa> [disparos]`: registra un
///   molde y su copia de planta, e imprime su id.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,mold_api=debug".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env().context("configuración inválida")?;
    let store = Arc::new(DieselWorkflowStore::new(&config.db).context("no se pudo abrir la base de datos")?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some(cmd) = args.first() {
        return match cmd.as_str() {
            "seed-mold" => seed_mold(&store, &args[1..]),
            other => bail!("comando desconocido: {}", other),
        };
    }

    let authorizer = StaticAuthorizer::parse(&config.actor_roles).context("MOLDFLOW_ACTOR_ROLES inválida")?;
    if authorizer.is_empty() {
        tracing::warn!("MOLDFLOW_ACTOR_ROLES vacía: todas las mutaciones serán rechazadas");
    }
    let service = WorkflowService::new(store,
                                       WorkflowEngine::new(config.workflow.clone()),
                                       Arc::new(authorizer),
                                       Arc::new(LogNotificationSink));

    let listener = TcpListener::bind(config.bind_addr).await
                                                      .with_context(|| format!("no se pudo escuchar en {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, policy = ?config.workflow.same_state_policy, "moldflow-server escuchando");
    axum::serve(listener, build_router(service)).await.context("el servidor terminó con error")?;
    Ok(())
}

fn seed_mold(store: &DieselWorkflowStore, args: &[String]) -> anyhow::Result<()> {
    let (code, company) = match args {
        [code, company, ..] => (code, company),
        _ => bail!("uso: seed-mold <código> <empresa> [disparos]"),
    };
    let company = Uuid::parse_str(company).with_context(|| format!("empresa inválida: {}", company))?;
    let shots = match args.get(2) {
        Some(s) => s.parse::<i64>().with_context(|| format!("disparos inválidos: {}", s))?,
        None => 0,
    };
    let mold = Mold::new(code, company, shots)?;
    store.transaction(|tx| {
             tx.insert_mold(&mold)?;
             tx.insert_plant_mirror(&PlantMold::new(mold.id(), company))?;
             Ok(())
         })?;
    println!("{}", mold.id());
    Ok(())
}
