//! Property tests: item indices stay contiguous under any operation sequence.

use formstate_core::path::FieldIndex;
use formstate_core::prelude::*;
use proptest::prelude::*;
use serde_json::json;

const MIN: usize = 1;
const MAX: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Delete(usize),
    Copy(usize),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Add),
        2 => (0..MAX + 1).prop_map(Op::Delete),
        2 => (0..MAX + 1).prop_map(Op::Copy),
        1 => Just(Op::Clear),
    ]
}

fn controller() -> FormController {
    let schema = FormSchema::from_value(json!({
        "type": "object",
        "properties": {
            "rows": {
                "type": "array", "style": "table", "minItems": MIN, "maxItems": MAX,
                "items": {"type": "object", "properties": {
                    "label": {"type": "text"},
                    "note": {"type": "text", "conditions": [{"type": "literal", "value": true}]}
                }}
            }
        }
    }))
    .unwrap();
    FormController::new(&schema, None, EngineConfig::default()).unwrap()
}

fn labels(ctl: &FormController) -> Vec<String> {
    let rows = ctl.path("object__rows").unwrap();
    let tree = &ctl.state().tree;
    tree.item_indices(&rows)
        .into_iter()
        .map(|i| tree.field(&rows.item(i).child("label")).unwrap().value.clone())
        .collect()
}

fn event(ctl: &mut FormController, ev: serde_json::Value) {
    // Out-of-range indices are addressing errors and leave the form untouched.
    let _ = ctl.handle(serde_json::from_value(ev).unwrap());
}

proptest! {
    #[test]
    fn indices_stay_contiguous(ops in proptest::collection::vec(op(), 1..40)) {
        let mut ctl = controller();
        let mut model: Vec<String> = vec![String::new()];
        let mut next = 0usize;

        for op in ops {
            match op {
                Op::Add => {
                    event(&mut ctl, json!({"op": "add_item", "container": "object__rows"}));
                    if model.len() < MAX {
                        let label = format!("r{next}");
                        next += 1;
                        let id = format!("object__rows__{}__label", model.len());
                        event(&mut ctl, json!({"op": "set", "id": id, "value": label}));
                        model.push(label);
                    }
                }
                Op::Delete(i) => {
                    event(&mut ctl, json!({"op": "delete_item", "container": "object__rows", "index": i}));
                    if i < model.len() && model.len() > MIN {
                        model.remove(i);
                    }
                }
                Op::Copy(i) => {
                    event(&mut ctl, json!({"op": "copy_row", "container": "object__rows", "index": i}));
                    if i < model.len() && model.len() < MAX {
                        let copy = model[i].clone();
                        model.insert(i + 1, copy);
                    }
                }
                Op::Clear => {
                    event(&mut ctl, json!({"op": "clear", "container": "object__rows"}));
                    model.truncate(MIN);
                }
            }

            let rows = ctl.path("object__rows").unwrap();
            let indices = ctl.state().tree.item_indices(&rows);
            prop_assert_eq!(indices, (0..model.len()).collect::<Vec<_>>());
            prop_assert_eq!(labels(&ctl), model.clone());

            // Every row keeps exactly one registered wrapper.
            prop_assert_eq!(ctl.state().conditions.len(), model.len());

            let snap = ctl.snapshot();
            let c = snap.containers.iter().find(|c| c.id == "object__rows").unwrap();
            prop_assert_eq!(c.add, model.len() < MAX);
            prop_assert_eq!(c.delete, model.len() > MIN);
        }
    }
}
