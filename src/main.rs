use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use drone_dispatch::config::{DatabaseConfig, DispatchSettings, EnvironmentConfig};
use drone_dispatch::database::DatabaseConnection;
use drone_dispatch::repositories::{DispatchRepository, PgDispatchRepository};
use drone_dispatch::routes::build_router;
use drone_dispatch::services::DispatchScanner;
use drone_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let env_config = EnvironmentConfig::from_env()?;

    // Configurar logging
    tracing_subscriber::fmt()
        .with_max_level(env_config.log_level)
        .init();

    info!("🚁 Drone Dispatch - Escáner y despachador de flota");
    info!("================================================");

    let db_config = DatabaseConfig::from_env()?;
    let settings = DispatchSettings::from_env()?;
    settings.validate()?;

    // Inicializar base de datos
    let db_connection = match DatabaseConnection::new(&db_config).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("❌ Error conectando a la base de datos: {}", e);
            return Err(anyhow::anyhow!("Error de base de datos: {}", e));
        }
    };
    db_connection.run_migrations().await?;

    let repository: Arc<dyn DispatchRepository> =
        Arc::new(PgDispatchRepository::new(db_connection.pool().clone()));

    // Escáner en background
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner = DispatchScanner::new(repository.clone(), settings.clone());
    let scanner_handle = tokio::spawn(scanner.run(shutdown_rx));

    let app_state = AppState::new(repository, settings, env_config.clone());
    let app = build_router(app_state);

    let addr: SocketAddr = env_config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("   POST /api/control/dispatch - Despachar un vehículo");
    info!("   POST /api/control/dispatchBatch - Despachar un lote de vehículos");
    info!("   GET  /api/control/getDispatch - Listar tareas de despacho");
    info!("   GET  /api/control/getFlightLogs - Listar registros de vuelo");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
    }

    // Detener el escáner tras la pasada en curso
    let _ = shutdown_tx.send(true);
    if let Err(e) = scanner_handle.await {
        error!("❌ El escáner terminó con error: {}", e);
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
