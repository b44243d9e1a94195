//! Demo target: a report built in three chained steps.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tasket_core::typed::{RegistryBuilder, Target, TaskContext, TaskRegistry};

pub struct Report {
    pub key: String,
    pub sections: Vec<String>,
}

impl Target for Report {
    const TYPE: &'static str = "demo.Report";
}

fn load_report(key: &str) -> Result<Report> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!("No report named {key:?}");
    }
    Ok(Report {
        key: key.to_string(),
        sections: vec!["summary".to_string(), "details".to_string(), "appendix".to_string()],
    })
}

async fn collect(report: Arc<Report>, ctx: TaskContext) -> Result<()> {
    for section in &report.sections {
        ctx.checkpoint()?;
        ctx.println(format!("collecting {section}"));
        ctx.sleep(Duration::from_millis(150)).await?;
    }
    Ok(())
}

async fn render(report: Arc<Report>, ctx: TaskContext) -> Result<()> {
    let mut out = ctx.writer();
    writeln!(out, "rendering {}", report.key)?;
    for (n, section) in report.sections.iter().enumerate() {
        writeln!(out, "  {}. {section}", n + 1)?;
    }
    ctx.sleep(Duration::from_millis(100)).await?;
    Ok(())
}

async fn publish(report: Arc<Report>, ctx: TaskContext) -> Result<()> {
    ctx.sleep(Duration::from_millis(100)).await?;
    ctx.println(format!("published {}.pdf", report.key));
    Ok(())
}

pub fn registry() -> Result<Arc<TaskRegistry>> {
    let registry = RegistryBuilder::new()
        .target::<Report, _>(load_report)
        .register::<Report, _>("collect", "Collect report data", &[], collect)
        .register::<Report, _>("render", "Render the report", &["collect"], render)
        .register::<Report, _>("publish", "Publish the report", &["render"], publish)
        .build()?;
    Ok(Arc::new(registry))
}
