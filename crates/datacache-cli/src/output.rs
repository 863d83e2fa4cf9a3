// SPDX-License-Identifier: Apache-2.0

use crate::OutputMode;
use datacache_store::{SpaceAssessment, SyncReport};
use serde_json::{json, Value};
use std::fmt::Write as _;

pub(crate) fn emit_ok(output_mode: OutputMode, payload: Value) -> Result<(), String> {
    if output_mode.json {
        println!(
            "{}",
            serde_json::to_string(&payload).map_err(|e| e.to_string())?
        );
    } else {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?
        );
    }
    Ok(())
}

pub(crate) fn emit_version(output_mode: OutputMode) -> Result<(), String> {
    if output_mode.json {
        emit_ok(
            output_mode,
            json!({"name": "datacache", "version": env!("CARGO_PKG_VERSION")}),
        )
    } else {
        println!("datacache {}", env!("CARGO_PKG_VERSION"));
        Ok(())
    }
}

pub(crate) fn render_report(report: &SyncReport, plan_only: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "cache: {}", report.cache_directory.display());
    let _ = writeln!(
        out,
        "catalog: {} ({} descriptors)",
        serde_json::to_value(report.catalog_source)
            .ok()
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default(),
        report.descriptors
    );
    for planned in &report.planned {
        let _ = writeln!(out, "planned {} [{}]", planned.file_name, planned.reason);
    }
    let _ = writeln!(out, "required bytes: {}", report.required_bytes);
    if plan_only {
        match &report.space {
            Some(SpaceAssessment::Sufficient) | None => {
                let _ = writeln!(out, "space: sufficient");
            }
            Some(SpaceAssessment::EvictionNeeded {
                candidates,
                recoverable_bytes,
            }) => {
                let _ = writeln!(
                    out,
                    "space: eviction of {} files ({recoverable_bytes} bytes) needed",
                    candidates.len()
                );
            }
            Some(SpaceAssessment::Insufficient {
                shortfall_bytes, ..
            }) => {
                let _ = writeln!(out, "space: insufficient, short by {shortfall_bytes} bytes");
            }
        }
        return out;
    }
    for name in &report.evicted {
        let _ = writeln!(out, "evicted {name}");
    }
    for name in &report.downloaded {
        let _ = writeln!(out, "downloaded {name}");
    }
    for failed in &report.failed {
        let _ = writeln!(out, "failed {} ({}): {}", failed.file_name, failed.code, failed.message);
    }
    let _ = writeln!(
        out,
        "{} downloaded, {} up to date, {} failed, {} bytes written, {} bytes available",
        report.downloaded.len(),
        report.skipped.len(),
        report.failed.len(),
        report.bytes_written,
        report.available_bytes
    );
    out
}
