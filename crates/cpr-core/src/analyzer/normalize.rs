//! Normalization of bridge output into the stable artifact models.
//!
//! Bridges differ between versions, so every accessor here is tolerant:
//! missing or oddly typed fields fall back to empty values instead of failing.

use serde_json::{Map, Value};

use crate::models::{
    CallRef, CamCopybook, CamProgram, CopyItem, IoOp, Paragraph, ProgramDivisions, SourceRef,
};

fn str_field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value.and_then(Value::as_object).cloned().unwrap_or_default()
}

/// A single object is treated as a one-element list.
fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => vec![],
    }
}

fn upper_strings(value: Option<&Value>) -> Vec<String> {
    as_list(value)
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::to_uppercase)
        .collect()
}

// ---------------------------------------------------------------------------
// Copybooks
// ---------------------------------------------------------------------------

fn copy_item(node: &Value) -> CopyItem {
    let level = ["@level", "level"]
        .iter()
        .find_map(|k| node.get(*k).and_then(scalar_string))
        .unwrap_or_default();
    let occurs = ["@occurs", "occurs"]
        .iter()
        .find_map(|k| node.get(*k))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        });
    let children_raw = node.get("item").or_else(|| node.get("children"));
    let children: Vec<CopyItem> = as_list(children_raw).into_iter().map(copy_item).collect();
    CopyItem {
        level: format!("{level:0>2}"),
        name: str_field(node, &["@name", "name"]).unwrap_or("").to_uppercase(),
        picture: str_field(node, &["@picture", "picture"]).unwrap_or("").to_string(),
        occurs,
        children: if children.is_empty() { None } else { Some(children) },
    }
}

/// Normalize a cb2xml tree (XML converted to JSON, attributes as `@name`).
///
/// Accepts the document root (`COBOL-COPYBOOK`), the `copybook` element, or a
/// bare element holding `item` children.
pub fn normalize_copybook(tree: &Value, name: &str, relpath: &str, sha256: &str) -> CamCopybook {
    let mut el = tree;
    if let Some(inner) = el.get("COBOL-COPYBOOK") {
        el = inner;
    }
    if let Some(inner) = el.get("copybook") {
        el = inner;
    }
    let items = as_list(el.get("item")).into_iter().map(copy_item).collect();
    CamCopybook {
        name: name.to_uppercase(),
        source: SourceRef {
            relpath: relpath.to_string(),
            sha256: sha256.to_string(),
        },
        items,
    }
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

fn note(key: &str, value: &Value) -> String {
    match value {
        Value::Null => format!("{key}=null"),
        Value::String(s) => format!("{key}={s}"),
        other => format!("{key}={other}"),
    }
}

fn paragraph(node: &Value) -> Paragraph {
    let calls = as_list(node.get("calls"))
        .into_iter()
        .filter_map(|c| serde_json::from_value::<CallRef>(c.clone()).ok())
        .map(|c| CallRef {
            target: c.target.to_uppercase(),
            dynamic: c.dynamic,
        })
        .collect();
    let io_ops = as_list(node.get("io_ops"))
        .into_iter()
        .filter_map(|io| serde_json::from_value::<IoOp>(io.clone()).ok())
        .collect();
    Paragraph {
        name: str_field(node, &["name"]).unwrap_or("").to_uppercase(),
        performs: upper_strings(node.get("performs")),
        calls,
        io_ops,
    }
}

/// Normalize a ProLeap bridge object into a [`CamProgram`].
///
/// Raw source text is never persisted; only its presence and length are
/// noted.
pub fn normalize_program(
    bridge: &Value,
    engine: &str,
    resolved_file: Option<&str>,
    relpath: &str,
    sha256: &str,
) -> CamProgram {
    let program_id = str_field(bridge, &["program_id", "programId"])
        .unwrap_or("")
        .trim()
        .to_uppercase();

    let divs = bridge.get("divisions");
    let divisions = ProgramDivisions {
        identification: object_or_empty(divs.and_then(|d| d.get("identification"))),
        environment: object_or_empty(divs.and_then(|d| d.get("environment"))),
        data: object_or_empty(divs.and_then(|d| d.get("data"))),
        procedure: object_or_empty(divs.and_then(|d| d.get("procedure"))),
    };

    let paragraphs = match bridge.get("paragraphs") {
        Some(Value::Array(items)) => items.iter().map(paragraph).collect(),
        _ => vec![],
    };

    let copybooks_raw = match bridge.get("copybooks_used") {
        Some(v @ Value::Array(_)) => Some(v),
        _ => bridge.get("copybooks").filter(|v| v.is_array()),
    };

    let mut notes = Vec::new();
    if let Some(fmt) = bridge.get("sourceFormat") {
        notes.push(note("sourceFormat", fmt));
    }
    notes.push(format!("engine={engine}"));
    if let Some(v) = bridge.get("cuCount") {
        notes.push(note("asg.cuCount", v));
    }
    if let Some(v) = bridge.get("progUnitCount") {
        notes.push(note("asg.progUnitCount", v));
    }
    match bridge.get("rawSource") {
        Some(Value::String(src)) => {
            notes.push("raw_source_embedded=true".to_string());
            notes.push(format!("raw_source_len={}", src.chars().count()));
        }
        Some(Value::Null) | None => {}
        Some(_) => notes.push("raw_source_embedded=true".to_string()),
    }
    if let Some(Value::Array(list)) = copybooks_raw {
        notes.push(format!("copybooks.count={}", list.len()));
    }
    if let Some(file) = resolved_file {
        notes.push(format!("resolvedFile={file}"));
    }

    CamProgram {
        program_id,
        source: SourceRef {
            relpath: relpath.to_string(),
            sha256: sha256.to_string(),
        },
        divisions,
        paragraphs,
        copybooks_used: upper_strings(copybooks_raw),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_copybook_nested_items() {
        let tree = json!({
            "COBOL-COPYBOOK": {
                "copybook": {
                    "item": {
                        "@level": "1",
                        "@name": "cust-rec",
                        "item": [
                            {"@level": "05", "@name": "cust-id", "@picture": "9(6)"},
                            {"@level": 5, "@name": "cust-tags", "@picture": "X(4)", "@occurs": "3"}
                        ]
                    }
                }
            }
        });
        let cb = normalize_copybook(&tree, "custrec", "copy/CUSTREC.cpy", "abc");
        assert_eq!(cb.name, "CUSTREC");
        assert_eq!(cb.source.relpath, "copy/CUSTREC.cpy");
        assert_eq!(cb.items.len(), 1);
        let root = &cb.items[0];
        assert_eq!(root.level, "01");
        assert_eq!(root.name, "CUST-REC");
        let children = root.children.as_ref().unwrap();
        assert_eq!(children[0].picture, "9(6)");
        assert!(children[0].children.is_none());
        assert_eq!(children[1].level, "05");
        assert_eq!(children[1].occurs, Some(3));
    }

    #[test]
    fn test_copybook_unknown_shape_is_empty() {
        let cb = normalize_copybook(&json!({"unexpected": true}), "x", "x.cpy", "s");
        assert!(cb.items.is_empty());
    }

    #[test]
    fn test_program_rich_output() {
        let bridge = json!({
            "status": "ok",
            "programId": " payroll ",
            "sourceFormat": "FIXED",
            "divisions": {"identification": {"author": "ops"}, "data": "not-an-object"},
            "paragraphs": [
                {
                    "name": "main-para",
                    "performs": ["init-para"],
                    "calls": [{"target": "subprog"}, {"bogus": 1}],
                    "io_ops": [{"op": "READ", "dataset_ref": "CUSTFILE", "fields": ["ID"]}]
                }
            ],
            "copybooks": ["custrec"],
            "rawSource": "       IDENTIFICATION DIVISION."
        });
        let program = normalize_program(&bridge, "JsonCli", None, "src/PAY.cbl", "sha");
        assert_eq!(program.program_id, "PAYROLL");
        assert_eq!(program.divisions.identification["author"], "ops");
        assert!(program.divisions.data.is_empty());
        assert_eq!(program.paragraphs[0].name, "MAIN-PARA");
        assert_eq!(program.paragraphs[0].performs, vec!["INIT-PARA"]);
        assert_eq!(program.paragraphs[0].calls.len(), 1);
        assert_eq!(program.paragraphs[0].calls[0].target, "SUBPROG");
        assert_eq!(program.paragraphs[0].io_ops[0].dataset_ref, "CUSTFILE");
        assert_eq!(program.copybooks_used, vec!["CUSTREC"]);
        assert!(program.notes.contains(&"sourceFormat=FIXED".to_string()));
        assert!(program.notes.contains(&"engine=JsonCli".to_string()));
        assert!(program.notes.contains(&"raw_source_embedded=true".to_string()));
        assert!(program.notes.contains(&"raw_source_len=31".to_string()));
        assert!(program.notes.contains(&"copybooks.count=1".to_string()));
    }

    #[test]
    fn test_program_minimal_output() {
        let bridge = json!({"status": "ok", "file": "/abs/a.cbl"});
        let program = normalize_program(&bridge, "RenovaCLI", Some("/abs/a.cbl"), "a.cbl", "s");
        assert_eq!(program.program_id, "");
        assert!(program.paragraphs.is_empty());
        assert!(program.copybooks_used.is_empty());
        assert_eq!(program.notes, vec!["engine=RenovaCLI", "resolvedFile=/abs/a.cbl"]);
    }
}
