use anyhow::{anyhow, Context, Result};
use ecgmon_lib::{io::write_export, session::Monitor};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
};

/// Answer control requests on stdin/stdout until EOF or `stop`.
pub fn run_stdio(monitor: &Monitor) -> Result<()> {
    let stdin = io::stdin();
    let reader = BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    info!("listening for control requests on stdin/stdout");
    serve(monitor, reader, &mut writer)
}

/// One JSON request per line in, one JSON response per line out.
pub fn serve<R: BufRead, W: Write>(monitor: &Monitor, mut reader: R, writer: &mut W) -> Result<()> {
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            info!("EOF reached, stopping control transport");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                error!("failed to parse request: {}", err);
                write_response(writer, &Response::error(None, err.to_string()))?;
                continue;
            }
        };

        if request.method == "stop" {
            write_response(writer, &Response::ok(request.id, json!({ "stopped": true })))?;
            info!("stop requested");
            break;
        }

        let response = match execute(monitor, &request.method, request.params) {
            Ok(result) => Response::ok(request.id, result),
            Err(err) => {
                error!("request '{}' failed: {:#}", request.method, err);
                Response::error(request.id, format!("{:#}", err))
            }
        };
        write_response(writer, &response)?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct CountParams {
    n: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    dir: PathBuf,
}

fn params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({}))).context("invalid params")
}

fn execute(monitor: &Monitor, method: &str, raw: Option<Value>) -> Result<Value> {
    let query = &monitor.config().query;
    let value = match method {
        "live" => serde_json::to_value(monitor.live())?,
        "smoothed" => {
            let p: CountParams = params(raw)?;
            serde_json::to_value(monitor.recent_smoothed(p.n.unwrap_or(query.ecg_points)))?
        }
        "bpm" => {
            let p: CountParams = params(raw)?;
            serde_json::to_value(monitor.recent_bpm(p.n.unwrap_or(query.bpm_points)))?
        }
        "events" => serde_json::to_value(monitor.active_events())?,
        "counts" => serde_json::to_value(monitor.occurrence_counts())?,
        "summary" => serde_json::to_value(monitor.summary())?,
        "reset" => {
            monitor.reset();
            json!({ "reset": true })
        }
        "export" => {
            let p: ExportParams = params(raw)?;
            let paths = write_export(&p.dir, &monitor.export())?;
            info!("export written to {}", p.dir.display());
            serde_json::to_value(paths)?
        }
        other => return Err(anyhow!("unknown method '{}'", other)),
    };
    Ok(value)
}

fn write_response(writer: &mut dyn Write, response: &Response) -> Result<()> {
    let serialized = serde_json::to_string(response)?;
    writer.write_all(serialized.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Request {
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Option<Value>,
    result: Option<Value>,
    error: Option<String>,
}

impl Response {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, err: String) -> Self {
        Self {
            id,
            result: None,
            error: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecgmon_lib::config::{DetectorConfig, MonitorConfig};
    use std::io::Cursor;

    fn monitor() -> Monitor {
        let monitor = Monitor::new(MonitorConfig {
            detector: DetectorConfig {
                amplitude_threshold: 100,
                min_rr_gap_s: 0.25,
            },
            ..MonitorConfig::default()
        })
        .unwrap();
        for i in 0..9 {
            monitor.ingest(200, i as f64 * 0.4);
        }
        monitor
    }

    fn roundtrip(monitor: &Monitor, input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(monitor, Cursor::new(input.to_string()), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn answers_queries_in_order() {
        let m = monitor();
        let responses = roundtrip(
            &m,
            concat!(
                "{\"id\":1,\"method\":\"live\"}\n",
                "\n",
                "{\"id\":2,\"method\":\"bpm\",\"params\":{\"n\":3}}\n",
                "{\"id\":\"e\",\"method\":\"events\"}\n",
            ),
        );
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["bpm"], 150);
        assert_eq!(responses[1]["result"], json!([150, 150, 150]));
        let events = responses[2]["result"].as_array().unwrap();
        assert!(events.contains(&json!("Tachycardia")));
    }

    #[test]
    fn reports_bad_requests_and_keeps_going() {
        let m = monitor();
        let responses = roundtrip(
            &m,
            "not json\n{\"id\":1,\"method\":\"nope\"}\n{\"id\":2,\"method\":\"counts\"}\n",
        );
        assert_eq!(responses.len(), 3);
        assert!(responses[0]["error"].is_string());
        assert!(responses[1]["error"]
            .as_str()
            .unwrap()
            .contains("unknown method"));
        assert_eq!(responses[2]["result"]["Tachycardia"], 1);
    }

    #[test]
    fn stop_ends_the_loop() {
        let m = monitor();
        let responses = roundtrip(
            &m,
            "{\"id\":1,\"method\":\"stop\"}\n{\"id\":2,\"method\":\"live\"}\n",
        );
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["result"]["stopped"], true);
    }

    #[test]
    fn reset_then_export() {
        let m = monitor();
        let dir = tempfile::tempdir().unwrap();
        let request = json!({
            "id": 9,
            "method": "export",
            "params": { "dir": dir.path().join("out") },
        });
        let input = format!("{{\"method\":\"reset\"}}\n{}\n", request);
        let responses = roundtrip(&m, &input);
        assert_eq!(responses[0]["result"]["reset"], true);
        let samples = responses[1]["result"]["samples"].as_str().unwrap();
        let text = std::fs::read_to_string(samples).unwrap();
        assert_eq!(text.trim(), "timestamp,ecg_value,cardiac_flags");
        assert_eq!(m.live().bpm, 0);
    }
}
