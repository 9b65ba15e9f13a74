//! Java bridge adapters: ProLeap for programs, cb2xml for copybooks.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::analyzer::normalize::{normalize_copybook, normalize_program};
use crate::analyzer::runner::{extract_json_line, run_with_timeout, truncate, CommandSpec};
use crate::analyzer::xml_tree::xml_to_value;
use crate::analyzer::{AnalyzeInput, Analyzer};
use crate::errors::AnalyzerError;
use crate::settings::{BridgeSettings, Settings};

const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };
const STDIO_EXCERPT_BYTES: usize = 400;
const STDERR_ERROR_BYTES: usize = 800;

fn classpath(jar: &Path, extra: Option<&str>) -> OsString {
    let mut cp = jar.as_os_str().to_os_string();
    if let Some(extra) = extra.filter(|e| !e.is_empty()) {
        cp.push(CLASSPATH_SEPARATOR);
        cp.push(extra);
    }
    cp
}

fn configured_jar<'a>(tool: &str, bridge: &'a BridgeSettings) -> Result<&'a Path, AnalyzerError> {
    match bridge.jar.as_deref() {
        Some(jar) if jar.exists() => Ok(jar),
        other => Err(AnalyzerError::NotConfigured(format!(
            "{tool} JAR missing or not configured: {other:?}"
        ))),
    }
}

/// Attach remediation hints for constructs the stock grammar rejects.
pub fn add_hints_to_error(msg: &str) -> String {
    if msg.contains("EXEC DLI") {
        return format!(
            "{msg} [Hint: IMS/EXEC DLI statements are not supported by the stock ProLeap grammar.]"
        );
    }
    if msg.contains("SEND-PLAIN-TEXT") {
        return format!(
            "{msg} [Hint: This looks like a CICS BMS macro form. The stock grammar doesn't \
             accept 'SEND-PLAIN-TEXT' as a verb; you may need vendor extensions or to \
             preprocess CICS macros.]"
        );
    }
    msg.to_string()
}

/// Engine label derived from the bridge entry point.
pub fn engine_name(main_class: &str) -> String {
    if main_class.contains("com.astra.proleap.JsonCli") {
        "JsonCli".to_string()
    } else if main_class.contains("com.renova.proleap.CLI") {
        "RenovaCLI".to_string()
    } else if main_class.is_empty() {
        "unknown".to_string()
    } else {
        main_class.to_string()
    }
}

// ---------------------------------------------------------------------------
// ProLeap
// ---------------------------------------------------------------------------

pub struct ProgramBridge {
    java_bin: String,
    bridge: BridgeSettings,
    source_format: String,
    timeout: Duration,
}

impl ProgramBridge {
    const TOOL: &'static str = "ProLeap";

    pub fn new(settings: &Settings) -> Self {
        Self {
            java_bin: settings.java_bin.clone(),
            bridge: settings.proleap.clone(),
            source_format: settings.source_format.clone(),
            timeout: settings.analyzer_timeout,
        }
    }

    fn build_command(&self, path: &Path) -> Result<CommandSpec, AnalyzerError> {
        let jar = configured_jar(Self::TOOL, &self.bridge)?;
        let main = self
            .bridge
            .main_class
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AnalyzerError::NotConfigured("PROLEAP_MAIN not configured.".to_string()))?;
        Ok(CommandSpec::new(&self.java_bin)
            .arg("-cp")
            .arg(classpath(jar, self.bridge.classpath.as_deref()))
            .arg(main)
            .arg(path.as_os_str())
            .env("COBOL_SOURCE_FORMAT", &self.source_format))
    }

    fn parse_bridge_output(&self, stdout: &str, exit_ok: bool) -> Result<Value, AnalyzerError> {
        let json_text = extract_json_line(stdout).ok_or_else(|| {
            AnalyzerError::InvalidOutput("ProLeap returned non-JSON output.".to_string())
        })?;
        let raw: Value = serde_json::from_str(json_text)
            .map_err(|_| AnalyzerError::InvalidOutput("ProLeap returned invalid JSON.".to_string()))?;
        if raw.get("status").and_then(Value::as_str) != Some("ok") {
            let msg = match raw.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "unknown error".to_string(),
            };
            return Err(AnalyzerError::Failed(add_hints_to_error(&msg)));
        }
        if !exit_ok {
            tracing::warn!("ProLeap exited non-zero but reported status=ok");
        }
        Ok(raw)
    }
}

impl Analyzer for ProgramBridge {
    fn analyze(&self, input: &AnalyzeInput) -> Result<Value, AnalyzerError> {
        let spec = self.build_command(&input.path)?;
        tracing::info!(
            command = %spec.display(),
            timeout_secs = self.timeout.as_secs(),
            "ProLeap exec"
        );
        let output = run_with_timeout(Self::TOOL, &spec, self.timeout)?;
        let raw = self.parse_bridge_output(&output.stdout, output.success).inspect_err(|err| {
            tracing::error!(
                exit_code = ?output.exit_code,
                elapsed_secs = output.elapsed.as_secs_f64(),
                stdout = truncate(&output.stdout, STDIO_EXCERPT_BYTES),
                stderr = truncate(&output.stderr, STDIO_EXCERPT_BYTES),
                error = %err,
                "ProLeap failed"
            );
        })?;

        let engine = engine_name(self.bridge.main_class.as_deref().unwrap_or(""));
        let abs = input.path.to_string_lossy();
        let resolved_file = raw
            .get("file")
            .and_then(Value::as_str)
            .filter(|f| *f != abs && *f != input.relpath);
        let program = normalize_program(&raw, &engine, resolved_file, &input.relpath, &input.sha256);
        tracing::info!(
            relpath = %input.relpath,
            engine = %engine,
            program_id = %program.program_id,
            paragraphs = program.paragraphs.len(),
            copybooks = program.copybooks_used.len(),
            elapsed_secs = output.elapsed.as_secs_f64(),
            "normalized program"
        );
        serde_json::to_value(program).map_err(|e| AnalyzerError::InvalidOutput(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// cb2xml
// ---------------------------------------------------------------------------

/// Runs cb2xml and normalizes the copybook tree it prints.
pub struct CopybookBridge {
    java_bin: String,
    bridge: BridgeSettings,
    timeout: Duration,
}

impl CopybookBridge {
    const TOOL: &'static str = "CB2XML";

    pub fn new(settings: &Settings) -> Self {
        Self {
            java_bin: settings.java_bin.clone(),
            bridge: settings.cb2xml.clone(),
            timeout: settings.analyzer_timeout,
        }
    }

    fn build_command(&self, path: &Path) -> Result<CommandSpec, AnalyzerError> {
        let jar = configured_jar(Self::TOOL, &self.bridge)?;
        let spec = match self.bridge.main_class.as_deref().filter(|m| !m.is_empty()) {
            Some(main) => CommandSpec::new(&self.java_bin)
                .arg("-cp")
                .arg(classpath(jar, self.bridge.classpath.as_deref()))
                .arg(main),
            None => CommandSpec::new(&self.java_bin).arg("-jar").arg(jar.as_os_str()),
        };
        Ok(spec.arg(path.as_os_str()))
    }
}

/// cb2xml builds disagree on which stream carries the document. XML is the
/// stock output; a JSON tree is accepted from bridges that convert upstream.
fn parse_tree(stdout: &str, stderr: &str) -> Result<Value, AnalyzerError> {
    for stream in [stdout, stderr] {
        if stream.trim_start().starts_with('<') {
            return xml_to_value(stream.trim());
        }
    }
    for stream in [stdout, stderr] {
        if let Some(json) = extract_json_line(stream) {
            return serde_json::from_str(json).map_err(|e| {
                AnalyzerError::InvalidOutput(format!("CB2XML returned invalid JSON: {e}"))
            });
        }
    }
    Err(AnalyzerError::InvalidOutput("CB2XML produced no XML output.".to_string()))
}

impl Analyzer for CopybookBridge {
    fn analyze(&self, input: &AnalyzeInput) -> Result<Value, AnalyzerError> {
        let spec = self.build_command(&input.path)?;
        tracing::info!(
            command = %spec.display(),
            timeout_secs = self.timeout.as_secs(),
            "CB2XML exec"
        );
        let output = run_with_timeout(Self::TOOL, &spec, self.timeout)?;
        if !output.success {
            return Err(AnalyzerError::Failed(format!(
                "CB2XML failed: {}",
                truncate(&output.stderr, STDERR_ERROR_BYTES)
            )));
        }
        let tree = parse_tree(&output.stdout, &output.stderr)?;
        let name = Path::new(&input.relpath)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let copybook = normalize_copybook(&tree, &name, &input.relpath, &input.sha256);
        serde_json::to_value(copybook).map_err(|e| AnalyzerError::InvalidOutput(e.to_string()))
    }
}
