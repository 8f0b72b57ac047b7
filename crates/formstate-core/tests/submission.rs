use formstate_core::prelude::*;
use serde_json::json;

fn schema() -> FormSchema {
    FormSchema::from_value(json!({
        "type": "object",
        "required": ["name"],
        "propertyOrder": ["name", "rows"],
        "properties": {
            "name": {"type": "text", "maxLength": 10},
            "rows": {
                "type": "array",
                "items": {"type": "object", "properties": {
                    "mass": {"type": "quantity", "units": [" g", "kg"]}
                }}
            }
        }
    }))
    .unwrap()
}

#[test]
fn pairs_follow_identifier_grammar() {
    let data = json!({"name": "  sample ", "rows": [{"mass": {"magnitude": 2, "units": " g"}}]});
    let mut ctl = FormController::new(&schema(), Some(&data), EngineConfig::default()).unwrap();
    let pairs = ctl.submit().unwrap();

    assert_eq!(
        pairs,
        vec![
            ("object__name".to_string(), "sample".to_string()),
            ("object__rows__0__mass__magnitude".to_string(), "2".to_string()),
            ("object__rows__0__mass__units".to_string(), " g".to_string()),
        ]
    );
}

#[test]
fn custom_root_prefix() {
    let mut cfg = EngineConfig::default();
    cfg.ids.root_prefix = "sample".to_string();
    let mut ctl = FormController::new(&schema(), Some(&json!({"name": "x"})), cfg).unwrap();
    let pairs = ctl.submit().unwrap();
    assert_eq!(pairs, vec![("sample__name".to_string(), "x".to_string())]);
}

#[test]
fn errors_block_until_fixed() {
    let mut ctl = FormController::new(&schema(), None, EngineConfig::default()).unwrap();
    assert!(matches!(ctl.submit(), Err(FormError::ValidationPending(1))));

    ctl.handle(FormEvent::Set {
        id: "object__name".into(),
        value: "far too long a name".into(),
    })
    .unwrap();
    let name = ctl.path("object__name").unwrap();
    assert_eq!(ctl.state().errors.get(&name).unwrap().code, "max_length");

    ctl.handle(FormEvent::Set {
        id: "object__name".into(),
        value: "ok".into(),
    })
    .unwrap();
    assert!(!ctl.state().errors.is_blocking());
    assert!(ctl.submit().is_ok());
}

#[test]
fn non_finite_results_submit_as_sentinels() {
    let schema = FormSchema::from_value(json!({
        "type": "object",
        "properties": {
            "mass": {"type": "quantity", "minimum": 0},
            "volume": {"type": "quantity", "minimum": 0},
            "density": {
                "type": "quantity", "minimum": 0,
                "calculation": {"property_names": ["mass", "volume"], "formula": "mass / volume"}
            }
        }
    }))
    .unwrap();
    let data = json!({"mass": 1, "volume": 0});
    let mut ctl = FormController::new(&schema, Some(&data), EngineConfig::default()).unwrap();

    assert_eq!(ctl.value("object__density"), Some("∞"));
    assert!(!ctl.state().errors.is_blocking());
    let pairs = ctl.submit().unwrap();
    assert!(pairs.contains(&("object__density__magnitude".to_string(), "∞".to_string())));

    ctl.handle(FormEvent::Set {
        id: "object__mass".into(),
        value: "0".into(),
    })
    .unwrap();
    assert_eq!(ctl.value("object__density"), Some("NaN"));
    assert!(ctl.submit().is_ok());
}
