//! Stage orchestration. Each stage fans out one blocking task per file,
//! bounded by `cleaning.workers`, and merges the per-file results in file
//! order.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::{PipelineConfig, RuleSetConfig, SubcategoryMap};
use crate::error::PipelineError;
use crate::models::{
    FeatureTableBuilder, FileOutcome, FileReport, ProductCatalog, RankedUser, RunSummary,
    StructuredTransaction, columns,
};
use crate::processor::{
    AssociationRule, CATEGORY_MONTH_COUNTS_FILE, FeatureExtractor, FileCleaner,
    HIGH_VALUE_METHODS_FILE, HighValuePayments, MONTH_COUNTS_FILE, QUARTER_COUNTS_FILE,
    RuleMiner, ScoreAggregator, SeasonalityReport, TRANSITIONS_FILE, TransactionStructurer,
    WEEKDAY_COUNTS_FILE, category_transactions, cleaned_records, payment_methods,
    payment_transactions, ranked_to_frame, refund_transactions, rules_to_frame,
    transactions_from_frame, transactions_to_frame,
};
use crate::storage::{ShardStore, read_text_columns, read_text_frame, write_csv};

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("Worker task panicked")?
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Clean every shard in the input directory. A shard that fails is reported
/// in the summary and the run continues.
pub async fn clean_shards(config: &PipelineConfig) -> Result<RunSummary> {
    let started = Instant::now();
    let store = ShardStore::new(&config.paths);
    store.ensure_output_dir()?;

    let shards = store.list_shards()?;
    let total = shards.len();
    let cleaner = Arc::new(FileCleaner::new(&config.cleaning));

    info!(
        "🚀 Cleaning {} shards with {} workers",
        total, config.cleaning.workers
    );

    let files: Vec<FileReport> = stream::iter(shards.into_iter().enumerate())
        .map(|(i, shard)| {
            let cleaner = Arc::clone(&cleaner);
            let output = store.cleaned_path_for(&shard);
            let name = file_name(&shard);

            async move {
                info!("[{}/{}] processing {}", i + 1, total, name);
                let file_started = Instant::now();

                let outcome = match blocking(move || {
                    let stats = cleaner.clean_file(&shard, &output)?;
                    Ok((stats, output))
                })
                .await
                {
                    Ok((stats, output_path)) => FileOutcome::Cleaned { stats, output_path },
                    Err(e) => {
                        error!("❌ Failed to clean {}: {:#}", name, e);
                        FileOutcome::Failed {
                            error: format!("{:#}", e),
                        }
                    }
                };

                FileReport {
                    file_name: name,
                    outcome,
                    elapsed: file_started.elapsed(),
                }
            }
        })
        .buffered(config.cleaning.workers)
        .collect()
        .await;

    let summary = RunSummary::new(files, started.elapsed());
    summary.log_summary();
    Ok(summary)
}

/// Two phases: collect every cleaned shard into one feature table, then
/// normalize and rank the frozen population.
pub async fn score_users(config: &PipelineConfig) -> Result<Vec<RankedUser>> {
    let store = ShardStore::new(&config.paths);
    let cleaned = store.list_cleaned()?;
    let extractor = Arc::new(FeatureExtractor::from_config(&config.scoring));

    info!("📥 Collecting features from {} cleaned shards", cleaned.len());
    let collect_started = Instant::now();

    let partials: Vec<(String, Result<FeatureTableBuilder>)> = stream::iter(cleaned)
        .map(|path| {
            let extractor = Arc::clone(&extractor);
            let name = file_name(&path);
            async move {
                let result = blocking(move || {
                    let df = read_text_columns(&path, &columns::SCORING)?;
                    let records = cleaned_records(&df)?;
                    Ok(extractor.extract_all(&records))
                })
                .await;
                (name, result)
            }
        })
        .buffered(config.cleaning.workers)
        .collect()
        .await;

    let mut builder = FeatureTableBuilder::new();
    for (name, partial) in partials {
        match partial {
            Ok(features) => {
                info!("  {}: {} users", name, features.len());
                builder.append(features);
            }
            Err(e) => warn!("⚠️ Skipping {} for scoring: {:#}", name, e),
        }
    }

    let table = builder.finish();
    info!(
        "⏱️ Collect phase: {} users in {:.2}s",
        table.len(),
        collect_started.elapsed().as_secs_f64()
    );

    if table.is_empty() {
        return Err(PipelineError::EmptyOutput("user scoring".to_string()).into());
    }

    let normalize_started = Instant::now();
    let aggregator = ScoreAggregator::new(config.scoring.weights, config.scoring.epsilon);
    let top = aggregator.score(&table).top_k(config.scoring.top_k);
    info!(
        "⏱️ Normalize phase: {:.2}s",
        normalize_started.elapsed().as_secs_f64()
    );

    let output = config.top_users_path();
    let mut df = ranked_to_frame(&top)?;
    write_csv(&output, &mut df)?;
    info!("💾 Saved top {} users to {}", top.len(), output.display());

    Ok(top)
}

/// Structure purchases from every cleaned shard. An unreadable catalog or
/// category table aborts; an unreadable shard is skipped.
pub async fn structure_transactions(config: &PipelineConfig) -> Result<Vec<StructuredTransaction>> {
    let catalog = ProductCatalog::from_file(&config.paths.catalog_path)?;
    let categories = SubcategoryMap::resolve(config.paths.category_table.as_deref())?;
    info!(
        "Loaded {} catalog products and {} subcategories",
        catalog.len(),
        categories.len()
    );

    let structurer = Arc::new(TransactionStructurer::new(catalog, categories));
    let cleaned = ShardStore::new(&config.paths).list_cleaned()?;

    let partials: Vec<(String, Result<Vec<StructuredTransaction>>)> = stream::iter(cleaned)
        .map(|path| {
            let structurer = Arc::clone(&structurer);
            let name = file_name(&path);
            async move {
                let result = blocking(move || {
                    let df = read_text_columns(&path, &columns::TRANSACTIONS)?;
                    structurer.structure_frame(&df)
                })
                .await;
                (name, result)
            }
        })
        .buffered(config.cleaning.workers)
        .collect()
        .await;

    let mut transactions = Vec::new();
    for (name, partial) in partials {
        match partial {
            Ok(mut batch) => {
                info!("  {}: {} transactions", name, batch.len());
                transactions.append(&mut batch);
            }
            Err(e) => warn!("⚠️ Skipping {} for transactions: {:#}", name, e),
        }
    }

    if transactions.is_empty() {
        return Err(PipelineError::EmptyOutput("transaction structuring".to_string()).into());
    }

    let output = config.transactions_path();
    let mut df = transactions_to_frame(&transactions)?;
    write_csv(&output, &mut df)?;
    info!(
        "💾 Saved {} structured transactions to {}",
        transactions.len(),
        output.display()
    );

    Ok(transactions)
}

pub fn load_transactions(config: &PipelineConfig) -> Result<Vec<StructuredTransaction>> {
    let path = config.transactions_path();
    let df = read_text_frame(&path)
        .with_context(|| format!("Run the transactions stage first ({})", path.display()))?;
    transactions_from_frame(&df)
}

/// Rules for each rule set, in configuration order, plus the payment
/// methods used for high-value purchases.
#[derive(Debug, Clone, Default)]
pub struct MinedRules {
    pub category: Vec<AssociationRule>,
    pub payment: Vec<AssociationRule>,
    pub refund: Vec<AssociationRule>,
    pub high_value: HighValuePayments,
}

pub async fn mine_rules(config: &PipelineConfig) -> Result<MinedRules> {
    let config = config.clone();
    blocking(move || {
        let transactions = load_transactions(&config)?;
        info!("⛏️ Mining rules over {} transactions", transactions.len());

        let rules = &config.rules;
        let output_dir = &config.paths.output_dir;

        let category = mine_and_write(
            "category",
            &category_transactions(&transactions),
            &rules.category,
            output_dir,
            |_| true,
        )?;

        let methods = payment_methods(&transactions);
        let payment = mine_and_write(
            "payment",
            &payment_transactions(&transactions),
            &rules.payment,
            output_dir,
            |rule| rule.has_antecedent_in(&methods),
        )?;

        let refund = mine_and_write(
            "refund",
            &refund_transactions(&transactions, |status| rules.is_refund(status)),
            &rules.refund,
            output_dir,
            |_| true,
        )?;

        let high_value =
            HighValuePayments::from_transactions(&transactions, rules.high_value_price);
        match high_value.preferred() {
            Some((method, count)) => info!(
                "💳 Preferred method above {}: {} ({} of {} purchases)",
                rules.high_value_price,
                method,
                count,
                high_value.total()
            ),
            None => warn!("⚠️ No purchases above {}", rules.high_value_price),
        }
        write_csv(
            &output_dir.join(HIGH_VALUE_METHODS_FILE),
            &mut high_value.to_frame()?,
        )?;

        Ok(MinedRules {
            category,
            payment,
            refund,
            high_value,
        })
    })
    .await
}

fn mine_and_write(
    name: &str,
    transactions: &[Vec<String>],
    rule_set: &RuleSetConfig,
    output_dir: &Path,
    keep: impl Fn(&AssociationRule) -> bool,
) -> Result<Vec<AssociationRule>> {
    info!("{} rules: {} transactions", name, transactions.len());
    let rules = RuleMiner::mine_rule_set(transactions, rule_set, keep);
    if rules.is_empty() {
        warn!("⚠️ No {} rules at any threshold", name);
    }

    let output = output_dir.join(&rule_set.output_file);
    write_csv(&output, &mut rules_to_frame(&rules)?)?;
    info!("💾 Saved {} {} rules to {}", rules.len(), name, output.display());

    Ok(rules)
}

pub async fn summarize_seasonality(config: &PipelineConfig) -> Result<SeasonalityReport> {
    let config = config.clone();
    blocking(move || {
        let transactions = load_transactions(&config)?;
        let report = SeasonalityReport::from_transactions(&transactions);
        if report.undated > 0 {
            warn!(
                "⚠️ {} transactions without a readable purchase_date left out",
                report.undated
            );
        }

        let output_dir: PathBuf = config.paths.output_dir.clone();
        write_csv(&output_dir.join(MONTH_COUNTS_FILE), &mut report.month_frame()?)?;
        write_csv(&output_dir.join(QUARTER_COUNTS_FILE), &mut report.quarter_frame()?)?;
        write_csv(&output_dir.join(WEEKDAY_COUNTS_FILE), &mut report.weekday_frame()?)?;
        write_csv(
            &output_dir.join(CATEGORY_MONTH_COUNTS_FILE),
            &mut report.category_month_frame()?,
        )?;
        write_csv(&output_dir.join(TRANSITIONS_FILE), &mut report.transitions_frame()?)?;
        info!(
            "📅 Seasonality over {} dated transactions saved to {}",
            report.dated(),
            output_dir.display()
        );

        Ok(report)
    })
    .await
}

/// Every stage in order. Scoring and structuring both read the cleaned
/// shards; rules and seasonality read the structured transactions.
pub async fn run_all(config: &PipelineConfig) -> Result<()> {
    let started = Instant::now();

    let summary = clean_shards(config).await?;
    if summary.succeeded() == 0 {
        return Err(PipelineError::EmptyOutput("shard cleaning".to_string()).into());
    }

    score_users(config).await?;
    structure_transactions(config).await?;
    mine_rules(config).await?;
    summarize_seasonality(config).await?;

    info!(
        "🎉 Pipeline finished in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
