use std::path::PathBuf;

use geoflow_core::models::{CoreError, CoreErrorKind};
use geoflow_core::registry::JobRegistry;
use geoflow_core::workflows::{DefinitionError, WorkflowDefinition};

fn demo_definition() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/area_report.yml")
}

#[test]
fn shipped_demo_definition_is_valid() {
    let definition = WorkflowDefinition::from_file(demo_definition()).unwrap();

    assert_eq!(definition.name, "area_report");
    assert_eq!(definition.steps.len(), 4);
    assert_eq!(definition.steps[3].task_type, "report_generation");
    assert_eq!(definition.steps[3].depends_on, Some(3));
    definition.validate(&JobRegistry::builtin()).unwrap();
}

#[test]
fn unregistered_task_types_fail_registry_validation_only() {
    let definition = WorkflowDefinition::from_yaml(
        "
name: custom
steps:
  - taskType: reproject
    stepNumber: 1
",
    )
    .unwrap();

    definition.validate_structure().unwrap();
    let error = definition.validate(&JobRegistry::builtin()).unwrap_err();
    assert!(matches!(
        error,
        DefinitionError::UnregisteredTaskType { step_number: 1, .. }
    ));

    let core: CoreError = error.into();
    assert_eq!(core.kind, CoreErrorKind::UnknownTaskType);
    assert_eq!(core.task_type.as_deref(), Some("reproject"));
}

#[test]
fn malformed_documents_map_to_invalid_definition() {
    let error = WorkflowDefinition::from_yaml("name: broken\nsteps: 7\n").unwrap_err();
    assert!(matches!(error, DefinitionError::Yaml(_)));
    assert_eq!(CoreError::from(error).kind, CoreErrorKind::InvalidDefinition);

    let missing = WorkflowDefinition::from_file(demo_definition().with_file_name("absent.yml"))
        .unwrap_err();
    assert!(matches!(missing, DefinitionError::Io { .. }));
}

#[test]
fn dependencies_must_point_backwards() {
    let definition = WorkflowDefinition::from_yaml(
        "
name: cyclic
steps:
  - taskType: analysis
    stepNumber: 1
    dependsOn: 2
  - taskType: notification
    stepNumber: 2
    dependsOn: 1
",
    )
    .unwrap();

    let error = definition.validate_structure().unwrap_err();
    assert!(matches!(
        error,
        DefinitionError::UnknownDependency {
            step_number: 1,
            depends_on: 2
        }
    ));
}
