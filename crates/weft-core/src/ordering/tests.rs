use super::*;
use crate::diagnostics::DiagnosticCode;
use crate::model::{
    Advice, Declaration, DeclarationKey, DeclarationKind, MemberSpec, TransformationKind,
    WeaveOrder,
};

fn introduce(id: u64, order: (u32, u32, u32), name: &str) -> Transformation {
    Transformation::from_parts(
        TransformationId(id),
        Advice::new("Notify", "Notify"),
        WeaveOrder::new(order.0, order.1, order.2),
        DeclarationKey::new("Order"),
        TransformationKind::Introduce {
            member: MemberSpec::new(name, DeclarationKind::Method),
        },
    )
}

fn implement(id: u64, order: (u32, u32, u32), member: &str) -> Transformation {
    let members = [("OnChanged".to_string(), DeclarationKey::new(member))]
        .into_iter()
        .collect();
    Transformation::from_parts(
        TransformationId(id),
        Advice::new("Notify", "Notify"),
        WeaveOrder::new(order.0, order.1, order.2),
        DeclarationKey::new("Order"),
        TransformationKind::ImplementInterface {
            interface: "INotify".to_string(),
            members,
        },
    )
}

fn program() -> SourceProgram {
    let order = Declaration::type_decl("Order", "Order.cs");
    let total = Declaration::member(&order, "Total", DeclarationKind::Method);
    SourceProgram::new().with(order).unwrap().with(total).unwrap()
}

fn ids(ordered: &[&Transformation]) -> Vec<u64> {
    ordered.iter().map(|t| t.id().0).collect()
}

#[test]
fn test_sort_uses_coordinates_not_submission_order() {
    let transformations = vec![
        introduce(1, (2, 0, 0), "A"),
        introduce(2, (1, 1, 0), "B"),
        introduce(3, (1, 0, 5), "C"),
    ];
    let sorted = sort_by_weave_order(&transformations).unwrap();
    assert_eq!(ids(&sorted), vec![3, 2, 1]);
}

#[test]
fn test_equal_coordinates_are_fatal() {
    let transformations = vec![introduce(1, (1, 0, 0), "A"), introduce(2, (1, 0, 0), "B")];
    let error = sort_by_weave_order(&transformations).unwrap_err();
    assert_eq!(
        error,
        WeaveError::AmbiguousOrder {
            first: TransformationId(1),
            second: TransformationId(2),
            order: WeaveOrder::new(1, 0, 0),
        }
    );
}

#[test]
fn test_duplicate_ids_are_fatal() {
    let transformations = vec![introduce(1, (1, 0, 0), "A"), introduce(1, (1, 0, 1), "B")];
    assert!(matches!(
        sort_by_weave_order(&transformations),
        Err(WeaveError::DuplicateTransformation { .. })
    ));
}

#[test]
fn test_ready_nodes_are_released_in_weave_order() {
    let transformations = vec![
        introduce(1, (1, 0, 0), "A").with_dependency(TransformationId(3)),
        introduce(2, (1, 0, 1), "B"),
        introduce(3, (1, 0, 2), "C"),
    ];
    let plan = WeavePlan::build(&transformations).unwrap();
    assert_eq!(
        plan.initialization_order(),
        &[TransformationId(2), TransformationId(3), TransformationId(1)]
    );
}

#[test]
fn test_non_hierarchical_transformations_stay_out_of_the_graph() {
    let mut ctx = crate::model::OrderingContext::new();
    let advice = Advice::new("Audit", "Audit");
    let annotation = Transformation::add_annotation(
        &mut ctx,
        &advice,
        "Order",
        crate::model::Annotation::new("Audited"),
    );
    let introduced = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("Audit", DeclarationKind::Method),
    );
    let transformations = vec![annotation, introduced];
    let plan = WeavePlan::build(&transformations).unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.initialization_order(), &[TransformationId(2)]);
}

#[test]
fn test_cycle_names_only_its_members() {
    let a = introduce(1, (1, 0, 0), "A").with_dependency(TransformationId(2));
    let b = introduce(2, (1, 0, 1), "B").with_dependency(TransformationId(1));
    let c = introduce(3, (1, 0, 2), "C").with_dependency(TransformationId(1));
    let labels = vec![a.to_display_string(), b.to_display_string()];

    let transformations = vec![c, b, a];
    let error = WeavePlan::build(&transformations).unwrap_err();
    assert_eq!(error, WeaveError::CircularDependency { members: labels });
    assert!(error.to_string().starts_with("circular transformation dependency"));
}

#[test]
fn test_unknown_dependency_is_fatal() {
    let transformations = vec![introduce(1, (1, 0, 0), "A").with_dependency(TransformationId(9))];
    assert!(matches!(
        WeavePlan::build(&transformations),
        Err(WeaveError::UnknownDependency {
            dependency: TransformationId(9),
            ..
        })
    ));
}

#[test]
fn test_interface_sees_member_introduced_by_dependency() {
    let transformations = vec![
        implement(2, (1, 0, 1), "Order::OnChanged").with_dependency(TransformationId(1)),
        introduce(1, (1, 0, 0), "OnChanged"),
    ];
    let plan = WeavePlan::build(&transformations).unwrap();
    let program = program();
    let mut bag = DiagnosticBag::new(false);
    let results = plan.initialize(&program, &mut bag);

    assert!(bag.diagnostics().is_empty());
    assert_eq!(
        results.produced_key(TransformationId(1)),
        Some(&DeclarationKey::new("Order::OnChanged"))
    );
    assert!(matches!(
        results.get(TransformationId(2)),
        Some(InitializationResult::Interface { .. })
    ));
}

#[test]
fn test_failed_initialization_propagates_to_dependents() {
    let transformations = vec![
        introduce(1, (1, 0, 0), "Total"),
        implement(2, (1, 0, 1), "Order::Total").with_dependency(TransformationId(1)),
    ];
    let plan = WeavePlan::build(&transformations).unwrap();
    let program = program();
    let mut bag = DiagnosticBag::new(false);
    let results = plan.initialize(&program, &mut bag);

    let codes: Vec<DiagnosticCode> = bag.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![DiagnosticCode::DeclarationExists, DiagnosticCode::DependencyFailed]
    );
    assert!(results.get(TransformationId(2)).is_some_and(InitializationResult::is_failed));
    assert!(bag.is_dropped(TransformationId(1)));
    assert!(bag.is_dropped(TransformationId(2)));
}

#[test]
fn test_interface_member_must_exist() {
    let transformations = vec![implement(1, (1, 0, 0), "Order::Missing")];
    let plan = WeavePlan::build(&transformations).unwrap();
    let program = program();
    let mut bag = DiagnosticBag::new(false);
    plan.initialize(&program, &mut bag);
    assert_eq!(bag.diagnostics()[0].code, DiagnosticCode::InterfaceMemberMissing);
}

#[test]
fn test_late_failure_reaches_transitive_dependents() {
    let transformations = vec![
        introduce(1, (1, 0, 0), "OnChanged"),
        implement(2, (1, 0, 1), "Order::OnChanged").with_dependency(TransformationId(1)),
        introduce(3, (1, 0, 2), "Notify").with_dependency(TransformationId(2)),
        introduce(4, (1, 0, 3), "Reset"),
    ];
    let plan = WeavePlan::build(&transformations).unwrap();
    let program = program();
    let mut bag = DiagnosticBag::new(false);
    let results = plan.initialize(&program, &mut bag);
    assert!(bag.diagnostics().is_empty());

    bag.contribution_failed(&transformations[0], DiagnosticCode::ExpansionFailed, "boom");
    assert_eq!(plan.fail_dependents(&results, &mut bag), 2);

    let codes: Vec<DiagnosticCode> = bag.diagnostics().iter().map(|d| d.code).collect();
    assert_eq!(
        codes,
        vec![
            DiagnosticCode::ExpansionFailed,
            DiagnosticCode::TargetUnavailable,
            DiagnosticCode::DependencyFailed,
        ]
    );
    assert!(bag.is_dropped(TransformationId(2)));
    assert!(bag.is_dropped(TransformationId(3)));
    assert!(!bag.is_dropped(TransformationId(4)));
    assert!(bag.diagnostics()[1].message.contains("'Order::OnChanged'"));
}
