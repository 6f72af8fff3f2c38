//! Tab lifecycle, send gating, post-send finalization, startup key
//! retrieval, and periodic cache eviction.

use std::time::Duration;

use mailseal::{
    Collaborators, ComposeDetails, MailSeal, MailSealConfig, MailSealError, Notice, SendDecision,
};
use mailseal_cache::{CacheStore, Credential};
use mailseal_core::{AttributeRequest, Conjunction};
use mailseal_testkit::{TestFixture, FAR_FUTURE};

const TS: i64 = 1_736_870_400;

async fn app_for(fx: &TestFixture, local_identity: &str) -> MailSeal {
    try_app_for(fx, local_identity).await.expect("start")
}

async fn try_app_for(
    fx: &TestFixture,
    local_identity: &str,
) -> Result<MailSeal, MailSealError> {
    MailSeal::start(
        Collaborators {
            cache: fx.cache.clone(),
            surface: fx.provider.clone(),
            key_service: fx.key_service.clone(),
            engine: fx.engine.clone(),
            mail: fx.mail.clone(),
            notifier: fx.notifier.clone(),
        },
        MailSealConfig::new(local_identity),
    )
    .await
}

fn details() -> ComposeDetails {
    ComposeDetails {
        from: "carol@example.com".into(),
        to: vec!["alice@example.com".into()],
        cc: vec![],
        bcc: vec![],
        subject: "subject".into(),
        body: "body".into(),
        is_plain_text: true,
        attachments: vec![],
    }
}

#[tokio::test]
async fn disabled_tab_passes_through() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;

    let decision = app.on_before_send_at(1, details(), TS).await?;
    assert!(matches!(decision, SendDecision::Passthrough(_)));
    assert_eq!(fx.surface.opens(), 0);

    Ok(())
}

#[tokio::test]
async fn open_popup_refocuses_and_cancels_the_send() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;
    app.tabs().set_open_popup(1, Some(55));

    let decision = app.on_before_send_at(1, details(), TS).await?;
    assert!(matches!(decision, SendDecision::Cancel));
    assert_eq!(fx.notifier.refocused(), vec![55]);

    // Popup closed: the send goes through.
    app.tabs().set_open_popup(1, None);
    let decision = app.on_before_send_at(1, details(), TS).await?;
    assert!(matches!(decision, SendDecision::Send(_)));

    Ok(())
}

#[tokio::test]
async fn bcc_blocks_the_send_until_cleared() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;

    let mut with_bcc = details();
    with_bcc.bcc = vec!["hidden@example.com".into()];

    let decision = app.on_before_send_at(1, with_bcc.clone(), TS).await?;
    assert!(matches!(decision, SendDecision::Cancel));

    let warnings = fx.notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].1, Notice::BccWarning);
    let warning_id = warnings[0].0;
    assert_eq!(
        app.tabs().get(1).unwrap().pending_notification,
        Some(warning_id)
    );

    // A second blocked send does not stack another warning.
    let decision = app.on_before_send_at(1, with_bcc, TS).await?;
    assert!(matches!(decision, SendDecision::Cancel));
    assert_eq!(fx.notifier.warnings().len(), 1);

    // Turning sealing off clears the pending warning.
    app.set_encryption(1, false).await;
    assert_eq!(fx.notifier.cleared(), vec![warning_id]);
    assert!(app.tabs().get(1).unwrap().pending_notification.is_none());

    Ok(())
}

#[tokio::test]
async fn tab_close_purges_state() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.on_compose_opened(2, None).await;
    assert_eq!(app.tabs().len(), 2);

    app.on_compose_closed(1);
    assert!(app.tabs().get(1).is_none());
    assert_eq!(app.tabs().len(), 1);

    Ok(())
}

#[tokio::test]
async fn after_send_moves_archive_and_deletes_ciphertext() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;

    let sealed = match app.on_before_send_at(1, details(), TS).await? {
        SendDecision::Send(d) => d,
        other => panic!("expected Send, got {other:?}"),
    };

    // The archival task runs concurrently; wait for it to land.
    let archived = loop {
        if let Some(id) = app.tabs().get(1).and_then(|s| s.archived_copy) {
            break id;
        }
        tokio::task::yield_now().await;
    };
    assert_eq!(fx.mail.messages_in("MailSeal Sent"), vec![archived]);

    // The host stores the sealed message in the sent folder.
    let sent = fx.mail.add_sealed_message(
        "Sent",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        sealed.attachments[0].data.clone(),
    );

    app.on_after_send(1, &[sent]).await?;

    // Plaintext archive moved into the real sent folder, ciphertext
    // deleted, tab state purged.
    assert_eq!(fx.mail.messages_in("Sent"), vec![archived]);
    assert!(!fx.mail.contains(sent));
    assert!(app.tabs().get(1).is_none());

    Ok(())
}

#[tokio::test]
async fn archival_failure_never_blocks_the_send() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;
    fx.mail.fail_imports(true);

    let decision = app.on_before_send_at(1, details(), TS).await?;
    assert!(matches!(decision, SendDecision::Send(_)));

    Ok(())
}

#[tokio::test]
async fn master_key_falls_back_to_the_cached_value() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    fx.cache
        .set_master_key(&fx.master_key().0)
        .await
        .map_err(MailSealError::Cache)?;
    fx.key_service.set_parameters_available(false);

    let app = app_for(&fx, "alice@example.com").await;
    assert_eq!(app.master_key(), &fx.master_key());

    Ok(())
}

#[tokio::test]
async fn startup_fails_hard_without_any_master_key() {
    let fx = TestFixture::new();
    fx.key_service.set_parameters_available(false);

    let err = try_app_for(&fx, "alice@example.com").await.unwrap_err();
    assert!(matches!(err, MailSealError::Configuration(_)));
}

#[tokio::test]
async fn startup_persists_the_fetched_master_key() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let _app = app_for(&fx, "alice@example.com").await;

    let stored = fx.cache.master_key().await.map_err(MailSealError::Cache)?;
    assert_eq!(stored, Some(fx.master_key().0));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cleanup_task_evicts_expired_credentials() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    let expired = Conjunction(vec![AttributeRequest::email("old@example.com")]);
    let valid = Conjunction(vec![AttributeRequest::email("new@example.com")]);
    fx.cache
        .put(&expired.canonical_hash(), &Credential::new("old", 100))
        .await
        .map_err(MailSealError::Cache)?;
    fx.cache
        .put(&valid.canonical_hash(), &Credential::new("new", FAR_FUTURE))
        .await
        .map_err(MailSealError::Cache)?;
    assert_eq!(fx.cache.len(), 2);

    let cleanup = app.spawn_cleanup();
    // Let the first tick run.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.cache.len(), 1);

    // Idempotent on later ticks.
    tokio::time::sleep(Duration::from_secs(1300)).await;
    assert_eq!(fx.cache.len(), 1);

    cleanup.abort();
    Ok(())
}
