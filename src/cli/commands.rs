use serde_json::{json, Value};
use tracing::info;

use super::{Command, StatsFormat};
use crate::build_cache_service;
use crate::config::AppConfig;
use crate::domain::semantic_cache::CacheStoreRequest;
use crate::infrastructure::observability::{init_metrics, publish_cache_gauges};
use crate::infrastructure::services::SemanticCacheService;

/// Run one subcommand against the configured cache and print its output
pub async fn run(command: Command, config: &AppConfig) -> anyhow::Result<()> {
    let service = build_cache_service(config)?;
    info!(
        entries = service.len().await,
        store = %config.cache.store_path.display(),
        "Semantic cache opened"
    );

    if let Command::Stats {
        format: StatsFormat::Prometheus,
    } = command
    {
        let handle = init_metrics()
            .ok_or_else(|| anyhow::anyhow!("Prometheus recorder could not be installed"))?;
        publish_cache_gauges(&service.get_stats().await);
        print!("{}", handle.render());
        return Ok(());
    }

    let output = execute(&service, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Perform a subcommand and return its JSON output
pub async fn execute(service: &SemanticCacheService, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Stats { .. } => serde_json::to_value(service.get_stats().await)?,

        Command::Lookup { query, threshold } => {
            let hit = service.get(&query, threshold).await?;
            json!({ "hit": hit })
        }

        Command::Put {
            query,
            response,
            conversation_id,
            task_id,
            tools,
        } => {
            let mut request = CacheStoreRequest::new(query, response).with_tools_used(tools);
            if let Some(id) = conversation_id {
                request = request.with_conversation_id(id);
            }
            if let Some(id) = task_id {
                request = request.with_task_id(id);
            }

            let entry_id = service.store(request).await?;
            json!({ "entry_id": entry_id })
        }

        Command::Sweep { max_age_hours } => {
            let removed = service.invalidate_by_age(max_age_hours).await?;
            json!({ "removed": removed })
        }

        Command::Clear => {
            let removed = service.len().await;
            service.invalidate_all().await;
            json!({ "removed": removed })
        }
    };

    Ok(output)
}
