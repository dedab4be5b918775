use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;

/// Initialize structured logging.
/// RUST_LOG wins over the configured level when it is set.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init()?;
    }

    tracing::debug!("checkpoint-flow telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span wrapping a single checkpoint transition request
pub fn create_transition_span(checkpoint_id: &str, action: &str, user_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "checkpoint_transition",
        checkpoint.id = checkpoint_id,
        action = action,
        user.id = user_id,
        correlation.id = correlation_id,
    )
}

/// Span wrapping work order creation
pub fn create_work_order_span(template_id: &str, user_id: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "work_order_creation",
        template.id = template_id,
        user.id = user_id,
        correlation.id = correlation_id,
    )
}
