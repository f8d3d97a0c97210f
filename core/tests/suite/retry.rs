use applique_core::ApplyErr;
use applique_core::config::EngineConfig;
use applique_protocol::Diagnostic;
use applique_protocol::ProposalStatus;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use crate::common::MergeBehavior;
use crate::common::test_engine;
use crate::common::test_engine_with;

#[tokio::test]
async fn diagnostics_extend_the_iteration_chain() -> anyhow::Result<()> {
    let test = test_engine();
    let turn = test.seed_turn("turn-1", "msg-1");
    test.documents.insert("src/app.ts", "const a = 1;\n");
    test.merge
        .push(MergeBehavior::Respond("const a = 2;\n".to_string()));
    test.diagnostics
        .push(vec![Diagnostic::error("`a` is never read", 1)]);

    let first = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v1", None)
        .await?;
    let applied = test.engine.apply(&first).await?;
    assert_eq!(applied.status, ProposalStatus::Success);
    assert_eq!(true, applied.has_unresolved_diagnostics());

    let second = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v2", None)
        .await?;
    assert_eq!(second.version, 2);
    assert_eq!(second.iteration_count, 2);
    Ok(())
}

#[tokio::test]
async fn clean_apply_resets_the_iteration_chain() -> anyhow::Result<()> {
    let test = test_engine();
    let turn = test.seed_turn("turn-1", "msg-1");
    test.documents.insert("src/app.ts", "const a = 1;\n");

    test.merge
        .push(MergeBehavior::Respond("const a = 2;\n".to_string()));
    test.diagnostics
        .push(vec![Diagnostic::error("`a` is never read", 1)]);
    let first = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v1", None)
        .await?;
    test.engine.apply(&first).await?;

    test.merge
        .push(MergeBehavior::Respond("const a = 3;\n".to_string()));
    let second = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v2", None)
        .await?;
    assert_eq!(second.iteration_count, 2);
    let applied = test.engine.apply(&second).await?;
    assert_eq!(false, applied.has_unresolved_diagnostics());

    let third = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v3", None)
        .await?;
    assert_eq!(third.iteration_count, 1);
    assert_eq!(third.version, 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_budget_fails_without_invoking_the_merge() -> anyhow::Result<()> {
    let test = test_engine();
    let turn = test.seed_turn("turn-1", "msg-1");
    test.documents.insert("src/app.ts", "const a = 1;\n");

    for round in 2u32..=4 {
        test.merge
            .push(MergeBehavior::Respond(format!("const a = {round};\n")));
        test.diagnostics
            .push(vec![Diagnostic::error("still unused", 1)]);
        let registered = test
            .engine
            .register_proposal(&turn, "src/app.ts", "// retry", None)
            .await?;
        assert_eq!(registered.iteration_count, round - 1);
        let applied = test.engine.apply(&registered).await?;
        assert_eq!(applied.status, ProposalStatus::Success);
    }
    assert_eq!(test.merge.calls(), 3);

    let fourth = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// retry", None)
        .await?;
    assert_eq!(fourth.iteration_count, 4);
    let err = test
        .engine
        .apply(&fourth)
        .await
        .expect_err("budget should be exhausted");

    assert_matches!(err, ApplyErr::IterationBudgetExceeded { iterations: 4, .. });
    assert_eq!(test.merge.calls(), 3);
    assert_eq!(
        test.engine.proposal(&turn, &fourth.id)?.status,
        ProposalStatus::Failed
    );
    Ok(())
}

#[tokio::test]
async fn a_smaller_budget_is_honored() -> anyhow::Result<()> {
    let test = test_engine_with(EngineConfig {
        max_apply_iterations: 1,
        ..EngineConfig::default()
    });
    let turn = test.seed_turn("turn-1", "msg-1");
    test.documents.insert("src/app.ts", "const a = 1;\n");
    test.merge
        .push(MergeBehavior::Respond("const a = 2;\n".to_string()));
    test.diagnostics
        .push(vec![Diagnostic::error("still unused", 1)]);

    let first = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v1", None)
        .await?;
    test.engine.apply(&first).await?;

    let second = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// v2", None)
        .await?;
    let err = test
        .engine
        .apply(&second)
        .await
        .expect_err("budget should be exhausted");

    assert_matches!(err, ApplyErr::IterationBudgetExceeded { iterations: 2, .. });
    assert_eq!(test.merge.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_merge_marks_the_proposal_failed() -> anyhow::Result<()> {
    let test = test_engine();
    let turn = test.seed_turn("turn-1", "msg-1");
    test.documents.insert("src/app.ts", "const a = 1;\n");
    test.merge
        .push(MergeBehavior::Fail("model unavailable".to_string()));

    let registered = test
        .engine
        .register_proposal(&turn, "src/app.ts", "// edit", None)
        .await?;
    let err = test
        .engine
        .apply(&registered)
        .await
        .expect_err("apply should fail");

    assert_matches!(err, ApplyErr::MergeRequest { .. });
    assert_eq!(test.surface.session_count(), 0);
    assert_eq!(
        test.engine.proposal(&turn, &registered.id)?.status,
        ProposalStatus::Failed
    );
    Ok(())
}
