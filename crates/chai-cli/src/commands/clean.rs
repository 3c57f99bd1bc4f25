use super::{fail, print_json};
use chai_core::pkg::{clean, CleanOptions};
use chai_core::Config;
use miette::{IntoDiagnostic, Result};

pub fn run(config: &Config, options: CleanOptions, json: bool) -> Result<()> {
    let sandbox = config.sandbox();
    sandbox.ensure_dirs().into_diagnostic()?;

    let report = match clean(&sandbox, options) {
        Ok(report) => report,
        Err(e) => return fail(e, json),
    };

    if json {
        print_json(&serde_json::json!({
            "ok": true,
            "cleaned": report.cleaned,
            "freed_bytes": report.freed_bytes(),
        }));
    } else {
        for dir in &report.cleaned {
            println!("Cleaned {} ({})", dir.name, format_bytes(dir.freed_bytes));
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
