//! Property-based tests for model types.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{Action, FieldPath, ModelType};

    /// Strategy to generate dotted field paths like "parent.owner"
    fn dotted_path_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z][a-z0-9]{0,9}", 1..5)
    }

    proptest! {
        #[test]
        fn test_field_path_roundtrip(segments in dotted_path_strategy()) {
            let input = segments.join(".");
            let path = FieldPath::parse(&input);
            prop_assert!(path.is_ok(), "Failed for path: {}", input);
            let path = path.unwrap();
            prop_assert_eq!(path.segments(), segments.as_slice());
            prop_assert_eq!(path.to_string(), input);
        }

        #[test]
        fn test_double_underscore_matches_dotted(segments in dotted_path_strategy()) {
            let dotted = FieldPath::parse(&segments.join(".")).unwrap();
            let underscored = FieldPath::parse(&segments.join("__")).unwrap();
            prop_assert_eq!(dotted, underscored);
        }

        #[test]
        fn test_unknown_operations_pass_through(op in "[a-z_]{1,20}") {
            let known = [
                "list", "retrieve", "view", "update", "partial_update", "change",
                "destroy", "delete", "create", "add",
            ];
            let action = Action::from_operation(&op);
            if !known.contains(&op.as_str()) {
                prop_assert_eq!(action.as_str(), op.as_str());
            }
        }

        #[test]
        fn test_codename_uses_lowercase_model(name in "[A-Z][A-Za-z0-9]{0,15}") {
            let model = ModelType::new(name.clone()).unwrap();
            let codename = Action::View.codename(&model);
            prop_assert_eq!(codename, format!("view_{}", name.to_lowercase()));
        }
    }
}
