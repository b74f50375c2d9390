//! Read-only stock report over an exported workshop snapshot.
//!
//! Usage: `atelier-report <snapshot.json> [--json]`

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};

use atelier_infra::{DashboardMetrics, InMemoryWorkshopStore, Workshop, WorkshopConfig, WorkshopSnapshot};
use atelier_inventory::{classify, Product};

const USAGE: &str = "usage: atelier-report <snapshot.json> [--json]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    snapshot: PathBuf,
    json: bool,
}

fn parse_args<I>(args: I) -> anyhow::Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut snapshot = None;
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
            path if snapshot.is_none() => snapshot = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument '{extra}'\n{USAGE}"),
        }
    }
    let snapshot = snapshot.context(USAGE)?;
    Ok(Args { snapshot, json })
}

fn load(path: &Path) -> anyhow::Result<Workshop<InMemoryWorkshopStore>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: WorkshopSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a workshop snapshot", path.display()))?;
    let store = InMemoryWorkshopStore::from_snapshot(snapshot).context("snapshot is inconsistent")?;
    let config = WorkshopConfig::from_env().context("invalid ATELIER_* configuration")?;
    Ok(Workshop::new(store, config))
}

fn render_text(critical: &[Product], metrics: &DashboardMetrics, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Stock report ({})", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out);

    if critical.is_empty() {
        let _ = writeln!(out, "No products at or below their minimum.");
    } else {
        let _ = writeln!(
            out,
            "{:<12} {:<30} {:>8} {:>8}  {}",
            "SKU", "NAME", "STOCK", "MINIMUM", "LEVEL"
        );
        for p in critical {
            let _ = writeln!(
                out,
                "{:<12} {:<30} {:>8} {:>8}  {}",
                p.sku,
                p.name,
                p.stock_actual,
                p.stock_minimo,
                classify(p)
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Active orders:            {}", metrics.active_orders);
    let _ = writeln!(out, "Completed orders:         {}", metrics.completed_orders);
    let _ = writeln!(
        out,
        "Revenue this month:       {}",
        metrics.completed_revenue_this_month
    );
    let _ = writeln!(
        out,
        "Critical products:        {} of {} ({}%)",
        metrics.critical_products, metrics.total_products, metrics.critical_stock_percentage
    );
    out
}

fn render_json(critical: &[Product], metrics: &DashboardMetrics) -> anyhow::Result<String> {
    let rows: Vec<serde_json::Value> = critical
        .iter()
        .map(|p| {
            serde_json::json!({
                "sku": p.sku,
                "name": p.name,
                "stock_actual": p.stock_actual,
                "stock_minimo": p.stock_minimo,
                "level": classify(p),
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "critical": rows,
        "dashboard": metrics,
    }))?)
}

fn main() -> anyhow::Result<()> {
    atelier_observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    let workshop = load(&args.snapshot)?;
    let now = Utc::now();

    let critical = workshop.list_critical()?;
    let metrics = workshop.dashboard(now)?;
    tracing::info!(
        snapshot = %args.snapshot.display(),
        products = metrics.total_products,
        critical = critical.len(),
        "report generated"
    );

    let rendered = if args.json {
        render_json(&critical, &metrics)?
    } else {
        render_text(&critical, &metrics, now)
    };
    println!("{rendered}");
    Ok(())
}
