//! Servo Control API server binary

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use servoctl_actuator::{default_factory, HoldMode, ServoConfig, ServoRegistry};
use servoctl_api::{build_app, AppOptions, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "servoctl-api")]
#[command(author = "Silvano Neto <dev@silvanoneto.com>")]
#[command(version = "2026.1.16")]
#[command(about = "REST + WebSocket API server for hobby servos", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "SERVOCTL_API_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8004, env = "SERVOCTL_API_PORT")]
    port: u16,

    /// BCM GPIO pins, one per servo (ids are assigned from 1 in this order)
    #[arg(long, value_delimiter = ',', default_value = "13,6,19,26", env = "SERVOCTL_PINS")]
    pins: Vec<u8>,

    /// Pulse width at 0° in seconds
    #[arg(long, default_value_t = 0.0005)]
    min_pulse: f64,

    /// Pulse width at 180° in seconds
    #[arg(long, default_value_t = 0.0025)]
    max_pulse: f64,

    /// Post-move policy: auto, hold or release
    #[arg(long, default_value = "auto")]
    hold_mode: HoldMode,

    /// Seconds to hold before an automatic detach
    #[arg(long, default_value_t = 1.0)]
    hold_time: f64,

    /// Keep holding in auto mode instead of detaching
    #[arg(long, default_value_t = false)]
    no_detach: bool,

    /// Step through intermediate angles
    #[arg(long, default_value_t = false)]
    smooth: bool,

    /// Interpolated writes per smoothed move
    #[arg(long, default_value_t = 10)]
    smooth_steps: u32,

    /// Seconds between smoothed writes
    #[arg(long, default_value_t = 0.02)]
    smooth_delay: f64,

    /// Use simulated servos instead of GPIO
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Enable CORS for all origins
    #[arg(long, default_value_t = false)]
    cors: bool,

    /// Disable rate limiting
    #[arg(long, default_value_t = false)]
    no_rate_limit: bool,
}

impl Args {
    fn servo_config(&self) -> ServoConfig {
        ServoConfig {
            min_pulse_width: self.min_pulse,
            max_pulse_width: self.max_pulse,
            hold_mode: self.hold_mode,
            detach_enabled: !self.no_detach,
            hold_time: self.hold_time,
            smooth_enabled: self.smooth,
            smooth_steps: self.smooth_steps,
            smooth_delay: self.smooth_delay,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "servoctl_api=info,servoctl_actuator=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.servo_config();

    let factory = default_factory(args.simulate).context("failed to open GPIO backend")?;
    let (registry, report) = ServoRegistry::start(args.pins.clone(), config.clone(), factory)
        .await
        .context("invalid servo configuration")?;

    for (id, err) in &report.failed {
        tracing::warn!(servo = id, error = %err, "servo unavailable");
    }

    let mut options = AppOptions::from_env();
    options.cors = args.cors;
    if args.no_rate_limit {
        options.rate_limit.enabled = false;
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid address {}:{}", args.host, args.port))?;

    tracing::info!("Servo API server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/docs", addr);
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /api/servos                  - List servos");
    tracing::info!("  GET  /api/servos/status           - Status of every servo");
    tracing::info!("  POST /api/servos/{{id}}/move        - Move one servo");
    tracing::info!("  POST /api/servos/move-all         - Move every servo");
    tracing::info!("  POST /api/servos/{{id}}/center      - Center one servo");
    tracing::info!("  POST /api/servos/{{id}}/hold|release - Attach or detach output");
    tracing::info!("  GET  /api/config                  - Current configuration");
    tracing::info!("  PUT  /api/config                  - Update configuration");
    tracing::info!("  GET  /ws                          - Status push channel");
    tracing::info!("  GET  /health                      - Health check");
    tracing::info!("  GET  /docs                        - Swagger UI");
    tracing::info!("");
    tracing::info!("Configuration:");
    tracing::info!(
        "  Servos: {} active of {} (pins {:?})",
        report.succeeded.len(),
        args.pins.len(),
        args.pins
    );
    tracing::info!(
        "  Hold mode: {} (detach {} after {}s)",
        config.hold_mode,
        if config.detach_enabled { "on" } else { "off" },
        config.hold_time
    );
    tracing::info!(
        "  Smoothing: {}",
        if config.smooth_enabled {
            format!("{} steps, {}s apart", config.smooth_steps, config.smooth_delay)
        } else {
            "disabled".to_string()
        }
    );
    tracing::info!(
        "  Authentication: {}",
        if options.auth.enabled {
            format!("{} API keys configured", options.auth.keys.len())
        } else {
            "disabled".to_string()
        }
    );
    tracing::info!(
        "  Rate limiting: {}",
        if options.rate_limit.enabled {
            format!(
                "{} req/s (burst: {})",
                options.rate_limit.requests_per_second, options.rate_limit.burst_size
            )
        } else {
            "disabled".to_string()
        }
    );

    let app = build_app(AppState::new(registry.clone()), options);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("draining servos");
    registry.shutdown().await;
    tracing::info!("Servo API server stopped");

    served.context("server error")
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Error waiting for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
