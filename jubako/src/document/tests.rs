//! Unit tests for document parsing, marshalling and patch application.

use rstest::rstest;
use serde_json::json;

use super::*;

#[rstest]
#[case(b"".as_slice())]
#[case(b"  \n\t".as_slice())]
#[case(b"null".as_slice())]
fn json_empty_input_is_empty_object(#[case] bytes: &[u8]) {
    let value = JsonDocument.parse(bytes).expect("empty input parses");
    assert_eq!(value, json!({}));
}

#[test]
fn json_rejects_non_object_root() {
    let err = JsonDocument.parse(b"[1, 2]").expect_err("array root is rejected");
    assert!(matches!(
        err.as_ref(),
        JubakoError::Parse {
            format: DocumentFormat::Json,
            ..
        }
    ));
}

#[test]
fn get_addresses_paths() {
    let bytes = br#"{"server": {"ports": [80, 443]}}"#;
    assert_eq!(
        JsonDocument.get(bytes, "/server/ports/1").expect("get succeeds"),
        Some(json!(443))
    );
    assert_eq!(JsonDocument.get(bytes, "/missing").expect("get succeeds"), None);
    assert_eq!(
        JsonDocument.get(bytes, "").expect("root lookup succeeds"),
        Some(json!({"server": {"ports": [80, 443]}}))
    );
}

#[test]
fn default_apply_round_trips_json() {
    let mut patches = PatchSet::new();
    patches.add("/server/host", json!("example.org"));
    patches.remove("/server/debug");
    let out = JsonDocument
        .apply(br#"{"server": {"debug": true}}"#, &patches)
        .expect("apply succeeds");
    let value = JsonDocument.parse(&out).expect("output parses");
    assert_eq!(value, json!({"server": {"host": "example.org"}}));
}

#[test]
fn for_extension_is_case_insensitive() {
    assert!(for_extension("JSON").is_some());
    assert!(for_extension("txt").is_none());
}

#[cfg(feature = "toml")]
mod toml_format {
    use super::*;

    const ORIGINAL: &str = "\
# Service settings
[server]
# where to listen
host = \"localhost\"
port = 8080 # default port

[logging]
level = \"info\"
";

    #[test]
    fn parse_converts_tables() {
        let value = TomlDocument
            .parse(ORIGINAL.as_bytes())
            .expect("toml parses");
        assert_eq!(
            value,
            json!({
                "server": {"host": "localhost", "port": 8080},
                "logging": {"level": "info"}
            })
        );
    }

    #[test]
    fn apply_preserves_comments() {
        let mut patches = PatchSet::new();
        patches.replace("/server/port", json!(9090));
        patches.add("/logging/file", json!("app.log"));
        let out = TomlDocument
            .apply(ORIGINAL.as_bytes(), &patches)
            .expect("apply succeeds");
        let text = String::from_utf8(out).expect("utf-8 output");
        assert!(text.contains("# Service settings"));
        assert!(text.contains("# where to listen"));
        assert!(text.contains("port = 9090 # default port"), "got:\n{text}");
        assert!(text.contains("file = \"app.log\""));
    }

    #[test]
    fn apply_creates_tables_and_removes_keys() {
        let mut patches = PatchSet::new();
        patches.add("/database/pool/size", json!(4));
        patches.remove("/logging/level");
        patches.remove("/not/there");
        let out = TomlDocument
            .apply(ORIGINAL.as_bytes(), &patches)
            .expect("apply succeeds");
        let value = TomlDocument.parse(&out).expect("output parses");
        assert_eq!(value["database"]["pool"]["size"], json!(4));
        assert_eq!(value["logging"], json!({}));
        assert_eq!(value["server"]["host"], json!("localhost"));
    }

    #[test]
    fn apply_edits_arrays() {
        let mut patches = PatchSet::new();
        patches.replace("/hosts/1", json!("b2"));
        patches.add("/hosts/-", json!("c"));
        let out = TomlDocument
            .apply(b"hosts = [\"a\", \"b\"]\n", &patches)
            .expect("apply succeeds");
        let value = TomlDocument.parse(&out).expect("output parses");
        assert_eq!(value["hosts"], json!(["a", "b2", "c"]));
    }

    #[rstest]
    #[case::append_by_length("/hosts/2", true)]
    #[case::append_dash("/hosts/-", true)]
    #[case::past_the_end("/hosts/5", false)]
    fn array_indices_match_in_memory_edits(#[case] path: &str, #[case] accepted: bool) {
        let original = b"hosts = [\"a\", \"b\"]\n";
        let mut patches = PatchSet::new();
        patches.add(path, json!("c"));
        let mut tree = TomlDocument.parse(original).expect("toml parses");
        let in_memory = patches.apply_to(&mut tree);
        let on_disk = TomlDocument.apply(original, &patches);
        assert_eq!(in_memory.is_ok(), accepted, "{in_memory:?}");
        assert_eq!(on_disk.is_ok(), accepted, "{on_disk:?}");
    }

    #[test]
    fn marshal_drops_nulls() {
        let out = TomlDocument
            .marshal(&json!({"a": 1, "b": null, "nested": {"c": "d"}}))
            .expect("marshal succeeds");
        let value = TomlDocument.parse(&out).expect("output parses");
        assert_eq!(value, json!({"a": 1, "nested": {"c": "d"}}));
    }
}

#[cfg(feature = "yaml")]
mod yaml_format {
    use super::*;

    #[test]
    fn parse_and_marshal() {
        let value = YamlDocument
            .parse(b"server:\n  port: 8080\n")
            .expect("yaml parses");
        assert_eq!(value, json!({"server": {"port": 8080}}));
        let out = YamlDocument.marshal(&value).expect("marshal succeeds");
        assert_eq!(YamlDocument.parse(&out).expect("reparse"), value);
    }
}
