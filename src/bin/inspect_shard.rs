use anyhow::Result;
use std::path::PathBuf;

use user_data_pipeline::config::PipelineConfig;
use user_data_pipeline::storage::{ShardStore, read_frame};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pipeline.toml"));
    let config = PipelineConfig::load(Some(config_path.as_path()))?;

    let store = ShardStore::new(&config.paths);
    let shards = store.list_shards()?;

    println!("=== INSPECTING {} SHARDS ===\n", shards.len());

    let mut failed = 0;
    for (i, shard) in shards.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, shards.len(), shard.display());

        match read_frame(shard) {
            Ok(df) => {
                println!("   Rows: {}", df.height());
                println!("   Schema:");
                for (name, dtype) in df.schema().iter() {
                    println!("     {:<20} {}", name, dtype);
                }
                println!("{}\n", df.head(Some(5)));
            }
            Err(e) => {
                failed += 1;
                println!("   ❌ {}\n", e);
            }
        }
    }

    println!(
        "=== {} readable, {} unreadable ===",
        shards.len() - failed,
        failed
    );
    Ok(())
}
