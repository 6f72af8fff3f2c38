//! End-to-end seal/unseal tests against the fully wired facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use mailseal::{
    AttributeRequest, Collaborators, ComposeDetails, Conjunction, MailSeal, MailSealConfig,
    MailSealError, PipelineError, RecipientId, SendDecision,
};
use mailseal_core::{Attachment, EnvelopeBuilder, Policy, PolicyBuilder};
use mailseal_session::{MemorySurface, Scripted, SessionOutcome};
use mailseal_testkit::{seal_container, TestFixture};

const TS: i64 = 1_736_870_400;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn app_for(fx: &TestFixture, local_identity: &str) -> MailSeal {
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
    .expect("start")
}

fn details_to(to: &[&str]) -> ComposeDetails {
    ComposeDetails {
        from: "carol@example.com".into(),
        to: to.iter().map(|s| s.to_string()).collect(),
        cc: vec![],
        bcc: vec![],
        subject: "quarterly numbers".into(),
        body: "the plaintext body".into(),
        is_plain_text: true,
        attachments: vec![],
    }
}

fn sealed_of(decision: SendDecision) -> ComposeDetails {
    match decision {
        SendDecision::Send(details) => details,
        other => panic!("expected Send, got {other:?}"),
    }
}

#[tokio::test]
async fn full_roundtrip_delivers_identical_envelope() -> anyhow::Result<()> {
    init_tracing();
    let fx = TestFixture::new();
    let app = app_for(&fx, "Alice <Alice@Example.com>").await;

    app.on_compose_opened(7, None).await;
    app.set_encryption(7, true).await;

    let sealed = sealed_of(
        app.on_before_send_at(7, details_to(&["alice@example.com"]), TS)
            .await?,
    );

    // Placeholder substitution: subject/body replaced, original
    // attachments stripped, ciphertext as the single attachment.
    assert_eq!(sealed.subject, "MailSeal Encrypted Message");
    assert_eq!(sealed.attachments.len(), 1);
    assert_eq!(sealed.attachments[0].name, "mailseal.encrypted");

    // The ciphertext arrives in the inbox and gets displayed.
    let ciphertext = sealed.attachments[0].data.clone();
    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        ciphertext,
    );
    fx.mail.set_displayed(Some(message));

    let delivered = app.decrypt_message_at(message, TS + 10).await?;
    let delivered_id = delivered.delivered.expect("relocation should find the message");

    // Byte-identical round trip against the deterministic envelope.
    let expected = EnvelopeBuilder::new("carol@example.com", TS)
        .to(["alice@example.com"])
        .subject("quarterly numbers")
        .plain_body("the plaintext body")
        .build()?;
    let stored = fx.mail.stored(delivered_id).expect("delivered message");
    assert_eq!(stored.raw, expected);
    assert_eq!(stored.header.folder.0, "Inbox");

    // Ciphertext deleted only after delivery; sender badge attached;
    // verified sender surfaced.
    assert!(!fx.mail.contains(message));
    assert!(stored
        .badges
        .iter()
        .any(|b| b.kind == "envelope" && b.value == "carol@example.com"));
    assert_eq!(
        delivered.sender.public.0[0].value.as_deref(),
        Some("carol@example.com")
    );

    // Replying to the delivered plaintext defaults to sealing on.
    app.on_compose_opened(8, Some(delivered_id)).await;
    assert!(app.tabs().get(8).unwrap().encrypt);

    Ok(())
}

#[tokio::test]
async fn multipart_envelope_roundtrip_with_pinned_boundary() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let seal = fx.seal_pipeline();

    fx.tabs.insert(3, true);
    let attachment = Attachment {
        name: "notes.txt".into(),
        content_type: "text/plain".into(),
        data: bytes::Bytes::from_static(b"attached contents"),
    };
    let mut details = details_to(&["alice@example.com"]);
    details.attachments = vec![attachment.clone()];

    let sealed = seal
        .seal(
            &fx.master_key(),
            mailseal_pipeline::SealRequest {
                tab: 3,
                details,
                timestamp: TS,
                boundary: Some("deadbeef".into()),
            },
        )
        .await?;

    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        sealed.details.attachments[0].data.clone(),
    );
    fx.mail.set_displayed(Some(message));

    let unseal = fx.unseal_pipeline();
    let delivered = unseal
        .unseal(message, "alice@example.com", &fx.verification_key(), TS)
        .await?;

    let expected = EnvelopeBuilder::new("carol@example.com", TS)
        .to(["alice@example.com"])
        .subject("quarterly numbers")
        .plain_body("the plaintext body")
        .attachment(attachment)
        .boundary("deadbeef")
        .build()?;
    let stored = fx.mail.stored(delivered.delivered.unwrap()).unwrap();
    assert_eq!(stored.raw, expected);

    Ok(())
}

#[tokio::test]
async fn override_policy_matches_miscased_local_identity() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    // The local identity is cased differently from the sealed policy:
    // canonicalization must make the match.
    let app = app_for(&fx, "A@Example.Com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;

    let mut overrides = BTreeMap::new();
    overrides.insert(
        RecipientId::canonicalize("a@example.com"),
        Conjunction(vec![AttributeRequest::new("attr.age", "18")]),
    );
    app.tabs().set_policy_override(1, overrides);

    let sealed = sealed_of(
        app.on_before_send_at(1, details_to(&["a@example.com"]), TS)
            .await?,
    );

    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["a@example.com"],
        TS,
        sealed.attachments[0].data.clone(),
    );
    fx.mail.set_displayed(Some(message));

    let delivered = app.decrypt_message_at(message, TS).await?;
    assert!(delivered.delivered.is_some());

    Ok(())
}

#[tokio::test]
async fn unknown_recipient_leaves_message_untouched() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    // Sealed for bob only.
    let policy = PolicyBuilder::new(TS).build(["bob@example.com"])?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        b"not for alice",
    )
    .await;
    let message =
        fx.mail
            .add_sealed_message("Inbox", "carol@example.com", &["bob@example.com"], TS, ciphertext);
    fx.mail.set_displayed(Some(message));

    let err = app.decrypt_message_at(message, TS).await.unwrap_err();
    assert!(matches!(
        err,
        MailSealError::Pipeline(PipelineError::RecipientUnknown(_))
    ));

    // The original ciphertext message is untouched and still sealed.
    assert!(fx.mail.contains(message));
    assert!(fx.mail.stored(message).unwrap().sealed.is_some());

    // Distinct user-visible notice.
    assert_eq!(fx.notifier.errors(), vec![mailseal::Notice::RecipientUnknown]);

    Ok(())
}

#[tokio::test]
async fn cached_credential_skips_the_surface() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    // Two separate messages sealed under the exact same conjunction.
    let policy = PolicyBuilder::new(TS).build(["alice@example.com"])?;
    let mut messages = Vec::new();
    for subject in ["first message", "second message"] {
        let envelope = EnvelopeBuilder::new("carol@example.com", TS)
            .to(["alice@example.com"])
            .subject(subject)
            .plain_body("body")
            .build()?;
        let ciphertext = seal_container(
            &fx.engine,
            &fx.master_key(),
            &policy,
            "carol@example.com",
            &envelope,
        )
        .await;
        messages.push(fx.mail.add_sealed_message(
            "Inbox",
            "carol@example.com",
            &["alice@example.com"],
            TS,
            ciphertext,
        ));
    }

    // First decrypt opens one Decryption session.
    fx.mail.set_displayed(Some(messages[0]));
    app.decrypt_message_at(messages[0], TS).await?;
    assert_eq!(fx.surface.opens(), 1);

    // Second decrypt of the same conjunction: cache hit, the surface is
    // never invoked again.
    fx.mail.set_displayed(Some(messages[1]));
    app.decrypt_message_at(messages[1], TS + 5).await?;
    assert_eq!(fx.surface.opens(), 1);

    Ok(())
}

#[tokio::test]
async fn closed_surface_cancels_and_caches_nothing() -> anyhow::Result<()> {
    let surface = Arc::new(MemorySurface::scripted([Scripted::Close]));
    let fx = TestFixture::with_provider(surface);
    let app = app_for(&fx, "alice@example.com").await;

    let policy = PolicyBuilder::new(TS).build(["alice@example.com"])?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        b"payload",
    )
    .await;
    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        ciphertext,
    );
    fx.mail.set_displayed(Some(message));

    let err = app.decrypt_message_at(message, TS).await.unwrap_err();
    assert!(matches!(
        err,
        MailSealError::Pipeline(PipelineError::SessionCancelled)
    ));

    // No credential cached, message untouched, no error notice (the
    // user closed it themselves).
    assert!(fx.cache.is_empty());
    assert!(fx.mail.contains(message));
    assert!(fx.notifier.errors().is_empty());

    Ok(())
}

#[tokio::test]
async fn second_decrypt_fails_immediately_while_one_is_in_flight() -> anyhow::Result<()> {
    let surface = Arc::new(MemorySurface::scripted([Scripted::Hold]));
    let fx = TestFixture::with_provider(surface.clone());
    let app = Arc::new(app_for(&fx, "alice@example.com").await);

    let policy = PolicyBuilder::new(TS).build(["alice@example.com"])?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        b"payload",
    )
    .await;
    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        ciphertext,
    );
    fx.mail.set_displayed(Some(message));

    // First decrypt parks at the disclosure surface.
    let first = tokio::spawn({
        let app = Arc::clone(&app);
        async move { app.decrypt_message_at(message, TS).await }
    });
    while surface.opens() == 0 {
        tokio::task::yield_now().await;
    }

    // Second start fails immediately; it does not queue.
    let err = app.decrypt_message_at(message, TS).await.unwrap_err();
    assert!(matches!(
        err,
        MailSealError::Pipeline(PipelineError::Concurrency)
    ));

    // Abandoning the held session frees the slot.
    surface.release_held(SessionOutcome::Abandoned);
    let first_result = first.await?;
    assert!(matches!(
        first_result,
        Err(MailSealError::Pipeline(PipelineError::SessionCancelled))
    ));

    // A fresh attempt reaches the surface again (script exhausted, so it
    // closes — but the slot is demonstrably free).
    let _ = app.decrypt_message_at(message, TS).await;
    assert_eq!(surface.opens(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn relocation_exhaustion_still_delivers() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    let policy = PolicyBuilder::new(TS).build(["alice@example.com"])?;
    let envelope = EnvelopeBuilder::new("carol@example.com", TS)
        .to(["alice@example.com"])
        .subject("hello")
        .plain_body("body")
        .build()?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        &envelope,
    )
    .await;
    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        ciphertext,
    );
    fx.mail.set_displayed(Some(message));

    // Every relocation query fails; the pipeline must still deliver.
    fx.mail.fail_queries(u32::MAX);

    let delivered = app.decrypt_message_at(message, TS).await?;
    assert!(delivered.delivered.is_none());

    // Ciphertext is gone, plaintext made it to the inbox anyway.
    assert!(!fx.mail.contains(message));
    assert_eq!(fx.mail.messages_in("Inbox").len(), 1);

    Ok(())
}

#[tokio::test]
async fn bad_key_service_status_fails_decryption() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    let policy = PolicyBuilder::new(TS).build(["alice@example.com"])?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        b"payload",
    )
    .await;
    let message = fx.mail.add_sealed_message(
        "Inbox",
        "carol@example.com",
        &["alice@example.com"],
        TS,
        ciphertext,
    );
    fx.mail.set_displayed(Some(message));

    fx.key_service.push_status("PENDING", "VALID");

    let err = app.decrypt_message_at(message, TS).await.unwrap_err();
    assert!(matches!(
        err,
        MailSealError::Pipeline(PipelineError::RemoteKeyService(_))
    ));
    assert!(fx.mail.contains(message));
    assert_eq!(fx.notifier.errors(), vec![mailseal::Notice::DecryptionFailed]);

    Ok(())
}

#[tokio::test]
async fn empty_override_is_a_configuration_error() -> anyhow::Result<()> {
    let fx = TestFixture::new();
    let app = app_for(&fx, "alice@example.com").await;

    app.on_compose_opened(1, None).await;
    app.set_encryption(1, true).await;

    let mut overrides = BTreeMap::new();
    overrides.insert(RecipientId::canonicalize("a@example.com"), Conjunction::new());
    app.tabs().set_policy_override(1, overrides);

    let err = app
        .on_before_send_at(1, details_to(&["a@example.com"]), TS)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MailSealError::Pipeline(PipelineError::Configuration(_))
    ));

    Ok(())
}

#[tokio::test]
async fn hidden_policy_is_readable_without_decrypting() -> anyhow::Result<()> {
    // The container header is parseable on its own: a recipient list is
    // recoverable with no key material involved.
    let fx = TestFixture::new();

    let policy: Policy = PolicyBuilder::new(TS).build(["a@x.example", "b@x.example"])?;
    let ciphertext = seal_container(
        &fx.engine,
        &fx.master_key(),
        &policy,
        "carol@example.com",
        b"payload",
    )
    .await;

    let (tx, mut rx) = mailseal_core::chunk_channel();
    tokio::spawn(async move {
        mailseal_core::chunk::send_split(&tx, ciphertext, 64).await;
    });
    let prologue = mailseal_core::read_prologue(&mut rx).await?;
    assert_eq!(prologue.policy, policy);

    Ok(())
}
