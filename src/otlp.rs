//! Reads OpenTelemetry trace exports (JSON, optionally gzipped) and turns them into span records.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::KeyValue;

use crate::task_timer::TaskTimer;
use crate::tree_builder::{build_tree, SpanRecord};
use crate::types::{time_point_from_unix_nano, TraceTree};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Attribute naming the class a traced method belongs to.
const CODE_NAMESPACE_ATTRIBUTE: &str = "code.namespace";
const SERVICE_NAME_ATTRIBUTE: &str = "service.name";

pub fn parse_trace_file(file_bytes: &[u8]) -> Result<Vec<ExportTraceServiceRequest>> {
    let t = TaskTimer::new("Parsing trace file");

    let mut decompressed = Vec::new();
    let json_bytes = if file_bytes.starts_with(&GZIP_MAGIC) {
        GzDecoder::new(file_bytes).read_to_end(&mut decompressed)?;
        decompressed.as_slice()
    } else {
        file_bytes
    };

    let file_str =
        std::str::from_utf8(json_bytes).map_err(|e| anyhow::anyhow!("File is not UTF8!: {}", e))?;
    let traces: Vec<ExportTraceServiceRequest> = serde_json::from_str(file_str)?;

    t.stop();
    Ok(traces)
}

fn attributes_map(attributes: &[KeyValue]) -> BTreeMap<&str, Option<&Value>> {
    attributes
        .iter()
        .map(|attribute| {
            (
                attribute.key.as_str(),
                attribute.value.as_ref().and_then(|v| v.value.as_ref()),
            )
        })
        .collect()
}

fn string_attribute(attributes: &BTreeMap<&str, Option<&Value>>, key: &str) -> Option<String> {
    match attributes.get(key) {
        Some(Some(Value::StringValue(value))) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

pub fn extract_span_records(requests: &[ExportTraceServiceRequest]) -> Vec<SpanRecord> {
    let t = TaskTimer::new("Extracting spans");

    let mut records = Vec::new();
    for request in requests {
        for rs in &request.resource_spans {
            let service_name = rs
                .resource
                .as_ref()
                .and_then(|r| {
                    string_attribute(&attributes_map(&r.attributes), SERVICE_NAME_ATTRIBUTE)
                })
                .unwrap_or_else(|| "unknown".to_string());

            for ss in &rs.scope_spans {
                for span in &ss.spans {
                    let attributes = attributes_map(&span.attributes);
                    let target_id = string_attribute(&attributes, CODE_NAMESPACE_ATTRIBUTE)
                        .unwrap_or_else(|| service_name.clone());

                    let parent_id = if span.parent_span_id.is_empty() {
                        None
                    } else {
                        Some(hex::encode(&span.parent_span_id))
                    };

                    records.push(SpanRecord {
                        id: hex::encode(&span.span_id),
                        parent_id,
                        start: time_point_from_unix_nano(span.start_time_unix_nano),
                        end: time_point_from_unix_nano(span.end_time_unix_nano),
                        method_ref: span.name.clone(),
                        target_id,
                    });
                }
            }
        }
    }

    t.stop();
    records
}

/// Reads, parses and builds the call tree of an OTLP JSON export.
pub fn load_trace_file(path: &Path) -> Result<TraceTree> {
    log::info!("Loading trace file {}", path.display());
    let file_bytes = std::fs::read(path)?;
    let requests = parse_trace_file(&file_bytes)?;
    let records = extract_span_records(&requests);
    log::info!("Extracted {} spans", records.len());
    Ok(build_tree(&records))
}
