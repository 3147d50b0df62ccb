mod common;

use common::*;
use indexmap::IndexSet;
use pretty_assertions::assert_eq;
use weft_core::model::{
    Annotation, ChainElementId, Expression, InsertedStatementKind, MemberSpec, Statement,
    WeaveOrder,
};
use weft_core::{
    print, Accessor, Advice, AspectLayerId, BodyFragment, BoundTemplate, DeclarationKind,
    DiagnosticCode, InsertPosition, Observability, OrderingContext, Severity, Signature,
    Transformation, TransformationId, Viewer, WeaveConfig, WeaveError, Weaver,
};

/// One transformation of every kind, across three layers
fn mixed_transformations() -> Vec<Transformation> {
    let mut ctx = OrderingContext::new();
    ctx.begin_step(AspectLayerId::new("Logging"));
    let logging_advice = Advice::new("Log", "Logging");
    let mut all = vec![
        Transformation::override_body(&mut ctx, &logging_advice, "Order::Total", logging("log")),
        Transformation::override_accessors(
            &mut ctx,
            &logging_advice,
            "Order::Name",
            [(Accessor::Set, logging("set"))],
        ),
        Transformation::insert_statement(
            &mut ctx,
            &logging_advice,
            "Order::.ctor",
            InsertedStatementKind::Beginning,
            marker("logged"),
        ),
    ];

    ctx.begin_step(AspectLayerId::new("Notify"));
    let notify = Advice::new("Notify", "Notify");
    let raise = Transformation::introduce(
        &mut ctx,
        &notify,
        "Order",
        MemberSpec::new("OnChanged", DeclarationKind::Method)
            .with_modifier("protected")
            .with_template(Accessor::Body, marker("raise"))
            .at(InsertPosition::after("Order::Changed")),
    );
    let raise_id = raise.id();
    all.push(raise);
    all.push(
        Transformation::implement_interface(
            &mut ctx,
            &notify,
            "Order",
            "INotify",
            [("Raise".to_string(), key("Order::OnChanged"))],
        )
        .with_dependency(raise_id),
    );
    let observable = Annotation::new("Observable");
    all.push(Transformation::add_annotation(&mut ctx, &notify, "Order", observable));

    ctx.begin_step(AspectLayerId::new("Caching"));
    let caching = Advice::new("Cache", "Caching");
    all.push(Transformation::override_body(&mut ctx, &caching, "Order::Total", logging("cache")));
    all.push(Transformation::redirect(&mut ctx, &caching, "Order::DisplayName", "Order::Name"));
    all
}

#[test]
fn test_weave_is_deterministic_regardless_of_submission_order() -> anyhow::Result<()> {
    let program = order_program()?;
    let transformations = mixed_transformations();
    let mut reversed = transformations.clone();
    reversed.reverse();

    let weaver = Weaver::default();
    let first = serde_json::to_string(&weaver.weave(&program, &transformations)?)?;
    let second = serde_json::to_string(&weaver.weave(&program, &transformations)?)?;
    let shuffled = serde_json::to_string(&weaver.weave(&program, &reversed)?)?;

    assert_eq!(first, second);
    assert_eq!(first, shuffled);
    Ok(())
}

#[test]
fn test_mixed_weave_output() -> anyhow::Result<()> {
    let program = order_program()?;
    let result = Weaver::default().weave(&program, &mixed_transformations())?;
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let order = result.output.get(&key("Order")).expect("type is emitted");
    assert_eq!(order.interfaces, vec!["INotify".to_string()]);
    assert_eq!(
        order.annotations,
        vec![Annotation::new("Serializable"), Annotation::new("Observable")]
    );

    let names: Vec<&str> = result
        .output
        .children(&key("Order"))
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            ".ctor",
            "items",
            "Total",
            "Total_Source",
            "Total_Logging",
            "Name",
            "set_Name_Source",
            "DisplayName",
            "Changed",
            "OnChanged",
        ]
    );

    let listing = print::render(&result.output);
    assert!(listing.contains("        get {\n            return this.Name;\n        }\n"));
    assert!(listing.contains("        set {\n            this.Name = value;\n        }\n"));
    assert!(listing.contains("    private void set_Name_Source(string value) {\n        name = value;\n    }\n"));
    assert!(listing.starts_with("// Order.cs\n[Serializable]\n[Observable]\npublic class Order : INotify {\n"));
    Ok(())
}

#[test]
fn test_every_helper_is_called_exactly_once() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let transformations: Vec<Transformation> = ["A", "B", "C", "D"]
        .iter()
        .map(|layer| {
            let advice = Advice::new(*layer, *layer);
            Transformation::override_body(&mut ctx, &advice, "Order::Total", logging(layer))
        })
        .collect();
    let result = Weaver::default().weave(&program, &transformations)?;

    let mut called: Vec<ChainElementId> = Vec::new();
    for declaration in &result.output.declarations {
        for output in declaration.accessors.values() {
            if let Some(body) = &output.body {
                let _ = body.clone().rewrite(|e| {
                    if let Expression::ChainCall { element, .. } = &e {
                        called.push(*element);
                    }
                    e
                });
            }
        }
    }

    let helpers: IndexSet<ChainElementId> = result
        .output
        .declarations
        .iter()
        .filter(|d| d.is_helper())
        .filter_map(|d| d.accessors.get(&Accessor::Body).and_then(|a| a.element))
        .collect();
    assert_eq!(helpers.len(), 4);
    assert_eq!(called.len(), helpers.len());
    assert_eq!(called.iter().copied().collect::<IndexSet<_>>(), helpers);
    for id in &helpers {
        assert!(result.output.chain_name(*id).is_some());
    }
    Ok(())
}

#[test]
fn test_failed_contribution_changes_nothing_else() -> anyhow::Result<()> {
    let program = order_program()?;
    let baseline = mixed_transformations();

    // Slots between the first and second pipeline steps
    let broken = Transformation::from_parts(
        TransformationId(900),
        Advice::new("Broken", "Logging"),
        WeaveOrder::new(1, 7, 0),
        key("Order::Total"),
        weft_core::TransformationKind::Override {
            templates: [(Accessor::Body, logging("broken").failing("bad template"))]
                .into_iter()
                .collect(),
        },
    );
    let missing = Transformation::from_parts(
        TransformationId(901),
        Advice::new("Broken", "Logging"),
        WeaveOrder::new(1, 8, 0),
        key("Order::Nowhere"),
        weft_core::TransformationKind::AddAnnotation {
            annotation: Annotation::new("Lost"),
        },
    );
    let mut with_failures = baseline.clone();
    with_failures.push(broken);
    with_failures.push(missing);

    let weaver = Weaver::default();
    let clean = weaver.weave(&program, &baseline)?;
    let degraded = weaver.weave(&program, &with_failures)?;

    assert_eq!(degraded.output, clean.output);
    let codes: Vec<DiagnosticCode> = degraded.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::ExpansionFailed, DiagnosticCode::TargetNotFound]);
    assert_eq!(degraded.summary.dropped, 2);
    assert_eq!(degraded.summary.woven, clean.summary.woven);
    Ok(())
}

#[test]
fn test_double_replace_drops_both_claimants() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Store", "Storage");
    let spec = |name: &str| {
        MemberSpec::new(name, DeclarationKind::Property)
            .with_signature(Signature::new().returns("List"))
            .with_template(Accessor::Get, BoundTemplate::new("get", returns("store")))
    };
    let first = Transformation::replace(&mut ctx, &advice, "Order::items", spec("Items"));
    let second = Transformation::replace(&mut ctx, &advice, "Order::items", spec("AllItems"));
    let first_id = first.id();

    let result = Weaver::default().weave(&program, &[first, second])?;

    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, DiagnosticCode::ReplaceConflict);
    assert_eq!(result.diagnostics[0].transformation, Some(first_id));
    assert!(result.output.contains(&key("Order::items")));
    assert!(!result.output.contains(&key("Order::Items")));
    assert!(!result.output.contains(&key("Order::AllItems")));
    assert!(result.output.elided.is_empty());
    assert_eq!(result.summary.dropped, 2);
    Ok(())
}

#[test]
fn test_introductions_follow_their_anchors() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Extras", "Extras");
    let reset = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("Reset", DeclarationKind::Method)
            .with_template(Accessor::Body, marker("reset"))
            .at(InsertPosition::after("Order::Total")),
    );
    let cache = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("cache", DeclarationKind::Field).at(InsertPosition::before("Order::items")),
    );
    let orphan = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("Orphan", DeclarationKind::Method)
            .with_template(Accessor::Body, marker("orphan"))
            .at(InsertPosition::after("Order::Nope")),
    );
    let nested = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("ResetAll", DeclarationKind::Method)
            .with_template(Accessor::Body, marker("reset all"))
            .at(InsertPosition::after("Order::Reset")),
    );
    let orphan_id = orphan.id();

    let result = Weaver::default().weave(&program, &[reset, cache, orphan, nested])?;

    let names: Vec<&str> = result
        .output
        .children(&key("Order"))
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            ".ctor",
            "cache",
            "items",
            "Total",
            "Reset",
            "ResetAll",
            "Name",
            "DisplayName",
            "Changed",
            "Orphan",
        ]
    );

    assert_eq!(result.diagnostics.len(), 1);
    let warning = &result.diagnostics[0];
    assert_eq!(warning.code, DiagnosticCode::AnchorMissing);
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.transformation, Some(orphan_id));
    assert!(!result.has_errors());

    let reset = result.output.get(&key("Order::Reset")).expect("Reset is emitted");
    assert_eq!(reset.insert_position, Some(InsertPosition::after("Order::Total")));
    let orphan = result.output.get(&key("Order::Orphan"));
    assert_eq!(orphan.and_then(|d| d.insert_position.clone()), None);
    Ok(())
}

#[test]
fn test_duplicate_introduction_is_rejected() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Extras", "Extras");
    let clash = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("Total", DeclarationKind::Method).with_template(Accessor::Body, marker("again")),
    );
    let cached = Annotation::new("Cached");
    let dependent = Transformation::add_annotation(&mut ctx, &advice, "Order::Total", cached)
        .with_dependency(clash.id());

    let result = Weaver::default().weave(&program, &[clash, dependent])?;
    let codes: Vec<DiagnosticCode> = result.diagnostics.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![DiagnosticCode::DeclarationExists, DiagnosticCode::DependencyFailed]);
    assert_eq!(result.output.get(&key("Order::Total")).map(|d| d.annotations.len()), Some(0));
    Ok(())
}

#[test]
fn test_observability_filters_views() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Scaffold", "Scaffold");
    let hidden = Transformation::introduce(
        &mut ctx,
        &advice,
        "Order",
        MemberSpec::new("scratch", DeclarationKind::Field),
    )
    .with_observability(Observability::CompileTimeOnly);
    let wrap = Transformation::override_body(&mut ctx, &advice, "Order::Total", logging("wrap"));

    let result = Weaver::default().weave(&program, &[hidden, wrap])?;
    let visible = |viewer| {
        result
            .output
            .visible_to(viewer)
            .map(|d| d.name.clone())
            .collect::<Vec<_>>()
    };

    let advice_view = visible(Viewer::Advice);
    assert!(!advice_view.contains(&"scratch".to_string()));
    assert!(!advice_view.contains(&"Total_Source".to_string()));

    let weaver_view = visible(Viewer::Weaver);
    assert!(weaver_view.contains(&"scratch".to_string()));
    assert!(!weaver_view.contains(&"Total_Source".to_string()));

    let printer_view = visible(Viewer::Printer);
    assert_eq!(printer_view.len(), result.output.len());
    Ok(())
}

#[test]
fn test_annotation_edits_apply_in_weave_order() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Audit", "Audit");
    let transformations = vec![
        Transformation::add_annotation(&mut ctx, &advice, "Order", Annotation::new("Audited")),
        Transformation::add_annotation(&mut ctx, &advice, "Order", Annotation::new("Audited")),
        Transformation::remove_annotation(&mut ctx, &advice, "Order", "Serializable"),
        Transformation::remove_annotation(&mut ctx, &advice, "Order", "Missing"),
    ];

    let result = Weaver::default().weave(&program, &transformations)?;
    let order = result.output.get(&key("Order")).expect("type is emitted");
    assert_eq!(order.annotations, vec![Annotation::new("Audited")]);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].code, DiagnosticCode::AnnotationMissing);

    let quiet = WeaveConfig {
        report_missing_annotations: false,
        ..WeaveConfig::default()
    };
    let result = Weaver::new(quiet).weave(&program, &transformations)?;
    assert!(result.diagnostics.is_empty());

    let strict = WeaveConfig {
        warnings_as_errors: true,
        ..WeaveConfig::default()
    };
    let result = Weaver::new(strict).weave(&program, &transformations)?;
    assert!(result.has_errors());
    Ok(())
}

#[test]
fn test_computed_initializer_gets_a_helper() -> anyhow::Result<()> {
    let program = order_program()?;
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Cache", "Caching");
    let computed = BoundTemplate::new(
        "init",
        BodyFragment::new(vec![
            Statement::Declare {
                name: "map".into(),
                value: Expression::call("NewMap", vec![]),
            },
            Statement::ret(Expression::ident("map")),
        ]),
    );
    let simple = BoundTemplate::new("zero", BodyFragment::new(vec![Statement::ret(Expression::int(0))]));
    let transformations = vec![
        Transformation::introduce(
            &mut ctx,
            &advice,
            "Order",
            MemberSpec::new("lookup", DeclarationKind::Field)
                .with_signature(Signature::new().returns("Map"))
                .with_initializer(computed),
        ),
        Transformation::introduce(
            &mut ctx,
            &advice,
            "Order",
            MemberSpec::new("hits", DeclarationKind::Field)
                .with_signature(Signature::new().returns("int"))
                .with_initializer(simple),
        ),
    ];

    let result = Weaver::default().weave(&program, &transformations)?;
    let listing = print::render(&result.output);
    assert!(listing.contains("    Map lookup = this.Initialize_lookup();\n"));
    assert!(listing.contains(
        "    private Map Initialize_lookup() {\n        var map = NewMap();\n        return map;\n    }\n"
    ));
    assert!(listing.contains("    int hits = 0;\n"));
    Ok(())
}

#[test]
fn test_circular_dependency_aborts_the_weave() {
    let program = order_program().expect("fixture builds");
    let mut ctx = OrderingContext::new();
    let advice = Advice::new("Loop", "Loops");
    let a_id = TransformationId(1);
    let b_id = TransformationId(2);
    let a = Transformation::from_parts(
        a_id,
        advice.clone(),
        ctx.next_order(),
        key("Order"),
        weft_core::TransformationKind::AddAnnotation {
            annotation: Annotation::new("A"),
        },
    )
    .with_dependency(b_id);
    let b = Transformation::from_parts(
        b_id,
        advice,
        ctx.next_order(),
        key("Order"),
        weft_core::TransformationKind::AddAnnotation {
            annotation: Annotation::new("B"),
        },
    )
    .with_dependency(a_id);

    let err = Weaver::default().weave(&program, &[a, b]).unwrap_err();
    assert!(matches!(err, WeaveError::CircularDependency { ref members } if members.len() == 2));
}
