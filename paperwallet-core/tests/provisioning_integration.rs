//! Integration tests: provisioning integration.
use std::sync::Arc;

use paperwallet_core::{
    credential,
    provisioning::{Encryption, Medium, ProvisioningOptions, ProvisioningStep},
    registration::{RegistrationError, RegistrationInfo, RegistrationWarning},
    transport::TransportError,
    ErrorKind, PaperWalletError,
};
use secrecy::SecretString;

mod common;
use common::{machine, RecordingTag, ScriptedCamera, ScriptedRegistrar, StepLog};

fn nfc_plain() -> ProvisioningOptions {
    ProvisioningOptions::new(Medium::Nfc, Encryption::None, None)
}

fn password(value: &str) -> Option<SecretString> {
    Some(SecretString::from(value.to_string()))
}

#[tokio::test]
async fn test_already_registered_stops_before_writing() {
    let registrar = ScriptedRegistrar::answering(vec![Err(RegistrationError::AlreadyRegistered {
        address: alloy_primitives::Address::repeat_byte(0x11),
    })]);
    let tag = RecordingTag::new();
    let mut machine = machine(registrar.clone(), ScriptedCamera::new(), Some(tag.clone()));

    let err = machine.start(nfc_plain()).await.unwrap_err();

    assert!(matches!(
        err,
        PaperWalletError::Registration(RegistrationError::AlreadyRegistered { .. })
    ));
    assert_eq!(machine.step(), &ProvisioningStep::RegistrationFailed);
    assert_eq!(machine.session().last_error(), Some(ErrorKind::BadRequest));
    assert_eq!(ErrorKind::BadRequest.to_string(), "BAD_REQUEST");
    assert!(tag.write_attempts().is_empty());
    assert_eq!(registrar.requests().len(), 1);
}

#[tokio::test]
async fn test_write_timeout_retries_with_identical_payload() {
    let tag = RecordingTag::new();
    tag.fail_next_write(TransportError::Timeout {
        operation: "tag write".to_string(),
    });
    let mut machine = machine(ScriptedRegistrar::new(), ScriptedCamera::new(), Some(tag.clone()));

    let err = machine.start(nfc_plain()).await.unwrap_err();
    assert!(matches!(
        err,
        PaperWalletError::Transport(TransportError::Timeout { .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(machine.step(), &ProvisioningStep::WriteFailed);
    assert_eq!(machine.session().last_error(), Some(ErrorKind::Transport));

    machine.retry_write().await.unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    assert_eq!(machine.session().last_error(), None);
    let attempts = tag.write_attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0], attempts[1]);
    assert_eq!(Some(attempts[1].as_slice()), machine.session().encoded_payload());
    assert_eq!(tag.sessions_open(), 0);
}

#[tokio::test]
async fn test_retry_after_landed_write_completes_without_writing_again() {
    let tag = RecordingTag::landing_failed_writes();
    tag.fail_next_write(TransportError::TagRemoved);
    let mut machine = machine(ScriptedRegistrar::new(), ScriptedCamera::new(), Some(tag.clone()));

    machine.start(nfc_plain()).await.unwrap_err();
    assert_eq!(machine.step(), &ProvisioningStep::WriteFailed);

    machine.retry_write().await.unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    assert_eq!(tag.write_attempts().len(), 1);
}

#[tokio::test]
async fn test_existing_tag_data_requires_confirmation() {
    let other = credential::encode(&credential::generate(None).unwrap());
    let other_address = credential::decode(&other).unwrap().address();
    let tag = RecordingTag::holding(other.clone());
    let mut machine = machine(ScriptedRegistrar::new(), ScriptedCamera::new(), Some(tag.clone()));

    machine.start(nfc_plain()).await.unwrap();

    assert_eq!(
        machine.step(),
        &ProvisioningStep::ConfirmOverwrite {
            existing_address: Some(other_address)
        }
    );
    assert!(tag.write_attempts().is_empty());

    machine.confirm_overwrite().await.unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    let written = tag.contents().unwrap();
    assert_ne!(written, other);
    assert_eq!(
        credential::decode(&written).unwrap().address(),
        machine.session().credential().unwrap().address()
    );
}

#[tokio::test]
async fn test_cancelled_overwrite_leaves_tag_untouched() {
    let tag = RecordingTag::holding(b"someone else's data".to_vec());
    let mut machine = machine(ScriptedRegistrar::new(), ScriptedCamera::new(), Some(tag.clone()));

    machine.start(nfc_plain()).await.unwrap();
    assert_eq!(
        machine.step(),
        &ProvisioningStep::ConfirmOverwrite {
            existing_address: None
        }
    );

    machine.cancel_overwrite().unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::WriteFailed);
    assert_eq!(machine.session().last_error(), Some(ErrorKind::UserCancelled));
    assert!(tag.write_attempts().is_empty());
    assert_eq!(tag.contents().unwrap(), b"someone else's data");

    // Retrying re-inspects the same tag and asks again instead of writing.
    machine.retry_write().await.unwrap();
    assert!(matches!(
        machine.step(),
        ProvisioningStep::ConfirmOverwrite { .. }
    ));
    assert!(tag.write_attempts().is_empty());
}

#[tokio::test]
async fn test_partial_registration_waits_for_operator() {
    let tag = RecordingTag::new();
    let mut machine = machine(ScriptedRegistrar::new(), ScriptedCamera::new(), Some(tag.clone()));
    let mut options = nfc_plain();
    options.sponsor_gas = true;

    machine.start(options).await.unwrap();

    let ProvisioningStep::RegistrationIncomplete { warnings } = machine.step().clone() else {
        panic!("expected an incomplete registration, got {}", machine.step());
    };
    assert!(matches!(
        warnings.as_slice(),
        [RegistrationWarning::GasSponsorshipFailed { .. }]
    ));
    assert_eq!(
        machine.session().last_error(),
        Some(ErrorKind::RegistrationPartialFailure)
    );
    assert!(tag.write_attempts().is_empty());

    machine.proceed().await.unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    assert_eq!(tag.write_attempts().len(), 1);
}

#[tokio::test]
async fn test_registration_retry_reuses_the_credential() {
    let registrar = ScriptedRegistrar::answering(vec![
        Err(RegistrationError::Network {
            url: "https://registrar.test/v1/paper-wallets".to_string(),
            status: None,
            error: "connection refused".to_string(),
        }),
        Ok(RegistrationInfo {
            ens_name: Some("gift.paperwallet.eth".to_string()),
            gas_approved: true,
            warnings: vec![],
        }),
    ]);
    let tag = RecordingTag::new();
    let mut machine = machine(registrar.clone(), ScriptedCamera::new(), Some(tag.clone()));
    let mut options = nfc_plain();
    options.name = Some("gift".to_string());
    options.sponsor_gas = true;

    let err = machine.start(options).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(machine.session().last_error(), Some(ErrorKind::Network));

    machine.retry_registration().await.unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    let requests = registrar.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(requests[0].name.as_deref(), Some("gift"));
    assert_eq!(
        machine.session().registration().unwrap().ens_name.as_deref(),
        Some("gift.paperwallet.eth")
    );
}

#[tokio::test]
async fn test_paper_credential_is_rendered_as_text() {
    let camera = ScriptedCamera::new();
    let mut machine = machine(ScriptedRegistrar::new(), camera.clone(), None);

    machine
        .start(ProvisioningOptions::new(
            Medium::Paper,
            Encryption::Encrypted,
            password("abc123"),
        ))
        .await
        .unwrap();

    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    let rendered = camera.rendered();
    assert_eq!(rendered.len(), 1);

    let payload = credential::decode(&credential::decode_text(&rendered[0]).unwrap()).unwrap();
    assert!(payload.is_encrypted());
    assert_eq!(
        payload.address(),
        machine.session().credential().unwrap().address()
    );
    let account = payload
        .unlock(password("abc123").as_ref())
        .unwrap();
    assert_eq!(account.address(), payload.address());
}

#[tokio::test]
async fn test_failed_render_can_be_retried() {
    let camera = ScriptedCamera::new();
    camera.fail_next_render(TransportError::DeviceUnavailable {
        reason: "printer offline".to_string(),
    });
    let mut machine = machine(ScriptedRegistrar::new(), camera.clone(), None);

    machine
        .start(ProvisioningOptions::new(Medium::Paper, Encryption::None, None))
        .await
        .unwrap_err();
    assert_eq!(machine.step(), &ProvisioningStep::WriteFailed);

    machine.retry_write().await.unwrap();
    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    assert_eq!(camera.rendered().len(), 1);
}

#[tokio::test]
async fn test_observer_sees_every_step() {
    let log = Arc::new(StepLog::default());
    let mut machine = machine(
        ScriptedRegistrar::new(),
        ScriptedCamera::new(),
        Some(RecordingTag::new()),
    )
    .with_observer(log.clone());

    machine.start(nfc_plain()).await.unwrap();

    assert_eq!(
        log.steps(),
        vec![
            ProvisioningStep::Generating,
            ProvisioningStep::Registering,
            ProvisioningStep::Writing,
            ProvisioningStep::Completed,
        ]
    );
    let id = machine.session().id();
    assert!(log.session_ids().iter().all(|seen| *seen == id));
}

#[tokio::test]
async fn test_actions_outside_their_step_are_rejected() {
    let mut machine = machine(
        ScriptedRegistrar::new(),
        ScriptedCamera::new(),
        Some(RecordingTag::new()),
    );

    let err = machine.retry_write().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(machine.cancel_overwrite().is_err());
    assert!(machine.proceed().await.is_err());

    machine.start(nfc_plain()).await.unwrap();
    assert_eq!(machine.step(), &ProvisioningStep::Completed);

    let err = machine.start(nfc_plain()).await.unwrap_err();
    assert!(matches!(err, PaperWalletError::InvalidState { .. }));
    assert!(machine.retry_registration().await.is_err());
    assert_eq!(machine.step(), &ProvisioningStep::Completed);
}

#[tokio::test]
async fn test_nfc_without_reader_stays_idle() {
    let registrar = ScriptedRegistrar::new();
    let mut machine = machine(
        registrar.clone(),
        ScriptedCamera::new(),
        Some(RecordingTag::unsupported()),
    );

    let err = machine.start(nfc_plain()).await.unwrap_err();

    assert!(matches!(
        err,
        PaperWalletError::Transport(TransportError::Unsupported)
    ));
    assert_eq!(machine.step(), &ProvisioningStep::Idle);
    assert!(machine.session().credential().is_none());
    assert!(registrar.requests().is_empty());
}

#[tokio::test]
async fn test_inconsistent_password_options_are_rejected() {
    let registrar = ScriptedRegistrar::new();
    let mut machine = machine(registrar.clone(), ScriptedCamera::new(), None);

    let err = machine
        .start(ProvisioningOptions::new(Medium::Paper, Encryption::Encrypted, None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(machine.step(), &ProvisioningStep::Idle);
    assert_eq!(machine.session().last_error(), Some(ErrorKind::InvalidInput));
    assert!(registrar.requests().is_empty());
}

#[tokio::test]
async fn test_reset_starts_a_new_session() {
    let registrar =
        ScriptedRegistrar::answering(vec![Err(RegistrationError::Rejected {
            reason: "400: name taken".to_string(),
        })]);
    let mut machine = machine(registrar.clone(), ScriptedCamera::new(), Some(RecordingTag::new()));

    machine.start(nfc_plain()).await.unwrap_err();
    let first = machine.session().id();
    let first_address = machine.session().credential().unwrap().address();

    machine.reset();

    assert_eq!(machine.step(), &ProvisioningStep::Idle);
    assert_ne!(machine.session().id(), first);
    assert!(machine.session().credential().is_none());
    assert_eq!(machine.session().last_error(), None);

    machine.start(nfc_plain()).await.unwrap();
    assert_eq!(machine.step(), &ProvisioningStep::Completed);
    let requests = registrar.requests();
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[1].address, first_address);
}
