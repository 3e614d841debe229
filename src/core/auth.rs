use crate::{
    camera::FrameSource,
    common::{FaceAuthError, Result},
    core::{
        embedding::encode_embedding,
        matcher::{MatchEngine, MatchOutcome, MatchPolicy},
        oracle::{extract_single_face, EmbeddingOracle},
    },
    storage::{IdentityRecord, IdentityStore, LoginAttempt, LoginRecorder, NewIdentity},
};

/// Registration and login over injected collaborators. Holds no state of its
/// own between requests.
pub struct FaceAuth<'a, O: ?Sized, S: ?Sized, H: ?Sized> {
    oracle: &'a O,
    store: &'a S,
    history: &'a H,
    policy: MatchPolicy,
}

impl<'a, O, S, H> FaceAuth<'a, O, S, H>
where
    O: EmbeddingOracle + ?Sized,
    S: IdentityStore + ?Sized,
    H: LoginRecorder + ?Sized,
{
    pub fn new(oracle: &'a O, store: &'a S, history: &'a H, policy: MatchPolicy) -> Self {
        Self { oracle, store, history, policy }
    }

    fn engine(&self) -> MatchEngine<'a, S> {
        MatchEngine::new(self.store, self.policy)
    }

    /// Validates registration fields and rejects taken usernames or emails.
    /// Needs no camera, so callers can run it before opening one.
    pub fn check_available<'s>(&self, username: &'s str, email: &'s str) -> Result<(&'s str, &'s str)> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(FaceAuthError::InvalidInput("Name and email are required".into()));
        }

        if self.store.find_by_username_or_email(username, email)?.is_some() {
            return Err(FaceAuthError::UserExists);
        }
        Ok((username, email))
    }

    pub fn register<F: FrameSource + ?Sized>(
        &self,
        source: &mut F,
        username: &str,
        email: &str,
    ) -> Result<IdentityRecord> {
        let (username, email) = self.check_available(username, email)?;

        let frame = source.capture()?;
        let embedding = extract_single_face(self.oracle, &frame)?;
        self.engine().check_duplicate(&embedding)?;

        let record = self.store.insert(NewIdentity {
            username: username.to_string(),
            email: email.to_string(),
            face_encoding: Some(encode_embedding(&embedding)),
        })?;

        tracing::info!("Registered user {} with id {}", record.username, record.id);
        Ok(record)
    }

    pub fn login<F: FrameSource + ?Sized>(&self, source: &mut F) -> Result<MatchOutcome> {
        let frame = source.capture()?;
        let query = extract_single_face(self.oracle, &frame)?;
        tracing::debug!("Face extracted, scanning enrolled identities");

        let outcome = self.engine().authenticate(&query)?;

        let attempt = match &outcome {
            MatchOutcome::Match { identity, distance } => {
                tracing::info!("Match found: {} (distance {:.4})", identity.username, distance);
                LoginAttempt::success(identity.id, *distance)
            }
            MatchOutcome::NoMatch => {
                tracing::info!("No match found");
                LoginAttempt::rejected()
            }
        };

        // The decision stands even if the audit write fails
        if let Err(e) = self.history.record_attempt(&attempt) {
            tracing::warn!("Failed to record login attempt: {}", e);
        }

        Ok(outcome)
    }
}
