//! Verb handlers
//!
//! One handler per verb. A handler validates its parameters, performs
//! exactly one operation against the call-control channel addressed by the
//! request's sessionRef, and emits exactly one success response. Handlers do
//! not branch on failure and never retry; failures propagate to the
//! isolation wrapper, which turns them into error responses. A stale retry
//! on a live call can produce audible double-actions, so retry policy lives
//! with the orchestrator or nowhere.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use callflow_core::{CallChannel, ChannelError, GatherOptions};

use crate::protocol::{Verb, VerbParams, VerbRequest, VerbResponse};

/// Failure raised inside a handler body
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Malformed request, rejected before any side effect
    #[error("validation failed: {0}")]
    Validation(String),

    /// The channel rejected or failed the operation
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Request carried parameters for a different verb
    #[error("wrong verb: expected {expected}, got {got}")]
    WrongVerb { expected: Verb, got: Verb },
}

/// A verb handler: one channel operation in, one response out
#[async_trait]
pub trait VerbHandler: Send + Sync {
    /// The verb this handler executes
    fn verb(&self) -> Verb;

    /// Execute the request. Success emits the response; any failure is the
    /// isolation wrapper's to classify.
    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError>;
}

fn wrong_verb(expected: Verb, request: &VerbRequest) -> HandlerError {
    HandlerError::WrongVerb {
        expected,
        got: request.verb(),
    }
}

/// Answers the leg so audio can flow
pub struct AnswerHandler {
    channel: Arc<dyn CallChannel>,
}

impl AnswerHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for AnswerHandler {
    fn verb(&self) -> Verb {
        Verb::Answer
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        if !matches!(request.params, VerbParams::Answer) {
            return Err(wrong_verb(Verb::Answer, request));
        }
        self.channel.answer(&request.session_ref).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Answer))
    }
}

/// Speaks synthesized text on the leg
pub struct SayHandler {
    channel: Arc<dyn CallChannel>,
}

impl SayHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for SayHandler {
    fn verb(&self) -> Verb {
        Verb::Say
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        let text = match &request.params {
            VerbParams::Say { text } => text,
            _ => return Err(wrong_verb(Verb::Say, request)),
        };
        if text.trim().is_empty() {
            return Err(HandlerError::Validation("say text must not be empty".into()));
        }
        self.channel.say(&request.session_ref, text).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Say))
    }
}

/// Plays media by URL on the leg
pub struct PlayHandler {
    channel: Arc<dyn CallChannel>,
}

impl PlayHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for PlayHandler {
    fn verb(&self) -> Verb {
        Verb::Play
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        let url = match &request.params {
            VerbParams::Play { url } => url,
            _ => return Err(wrong_verb(Verb::Play, request)),
        };
        if url.trim().is_empty() {
            return Err(HandlerError::Validation("play url must not be empty".into()));
        }
        self.channel.play(&request.session_ref, url).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Play))
    }
}

/// Collects speech or DTMF input from the leg
pub struct GatherHandler {
    channel: Arc<dyn CallChannel>,
}

impl GatherHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for GatherHandler {
    fn verb(&self) -> Verb {
        Verb::Gather
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        let options = match &request.params {
            VerbParams::Gather {
                source,
                timeout_ms,
                max_digits,
                finish_on_key,
            } => GatherOptions {
                source: *source,
                timeout_ms: *timeout_ms,
                max_digits: *max_digits,
                finish_on_key: *finish_on_key,
            },
            _ => return Err(wrong_verb(Verb::Gather, request)),
        };
        if options.max_digits == Some(0) {
            return Err(HandlerError::Validation(
                "gather max_digits must be at least 1".into(),
            ));
        }
        self.channel.gather(&request.session_ref, &options).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Gather))
    }
}

/// Transfers the leg to a target
pub struct DialHandler {
    channel: Arc<dyn CallChannel>,
}

impl DialHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for DialHandler {
    fn verb(&self) -> Verb {
        Verb::Dial
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        let target = match &request.params {
            VerbParams::Dial { target } => target,
            _ => return Err(wrong_verb(Verb::Dial, request)),
        };
        if target.0.trim().is_empty() {
            return Err(HandlerError::Validation(
                "dial target must not be empty".into(),
            ));
        }
        self.channel.dial(&request.session_ref, target).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Dial))
    }
}

/// Tears the leg down
pub struct HangupHandler {
    channel: Arc<dyn CallChannel>,
}

impl HangupHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for HangupHandler {
    fn verb(&self) -> Verb {
        Verb::Hangup
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        if !matches!(request.params, VerbParams::Hangup) {
            return Err(wrong_verb(Verb::Hangup, request));
        }
        self.channel.hangup(&request.session_ref).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Hangup))
    }
}

/// Stops sending the leg's audio
pub struct MuteHandler {
    channel: Arc<dyn CallChannel>,
}

impl MuteHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for MuteHandler {
    fn verb(&self) -> Verb {
        Verb::Mute
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        if !matches!(request.params, VerbParams::Mute) {
            return Err(wrong_verb(Verb::Mute, request));
        }
        self.channel.mute(&request.session_ref).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Mute))
    }
}

/// Resumes sending the leg's audio
pub struct UnmuteHandler {
    channel: Arc<dyn CallChannel>,
}

impl UnmuteHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl VerbHandler for UnmuteHandler {
    fn verb(&self) -> Verb {
        Verb::Unmute
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        if !matches!(request.params, VerbParams::Unmute) {
            return Err(wrong_verb(Verb::Unmute, request));
        }
        self.channel.unmute(&request.session_ref).await?;
        Ok(VerbResponse::ok(request.session_ref.clone(), Verb::Unmute))
    }
}

/// Sends DTMF digits on the leg
pub struct SendDtmfHandler {
    channel: Arc<dyn CallChannel>,
}

impl SendDtmfHandler {
    pub fn new(channel: Arc<dyn CallChannel>) -> Self {
        Self { channel }
    }

    fn valid_digits(digits: &str) -> bool {
        !digits.is_empty()
            && digits
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '*' | '#' | 'A'..='D' | 'a'..='d'))
    }
}

#[async_trait]
impl VerbHandler for SendDtmfHandler {
    fn verb(&self) -> Verb {
        Verb::SendDtmf
    }

    async fn handle(&self, request: &VerbRequest) -> Result<VerbResponse, HandlerError> {
        let digits = match &request.params {
            VerbParams::SendDtmf { digits } => digits,
            _ => return Err(wrong_verb(Verb::SendDtmf, request)),
        };
        if !Self::valid_digits(digits) {
            return Err(HandlerError::Validation(format!(
                "invalid DTMF digits: {:?}",
                digits
            )));
        }
        self.channel.send_dtmf(&request.session_ref, digits).await?;
        Ok(VerbResponse::ok(
            request.session_ref.clone(),
            Verb::SendDtmf,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::MockChannel;
    use callflow_core::SessionRef;

    #[tokio::test]
    async fn test_answer_emits_one_response_with_same_ref() {
        let channel = Arc::new(MockChannel::default());
        let handler = AnswerHandler::new(channel.clone());

        let request = VerbRequest::new("S1", VerbParams::Answer);
        let response = handler.handle(&request).await.unwrap();

        assert_eq!(response.session_ref, SessionRef::new("S1"));
        assert_eq!(response.verb, Verb::Answer);
        assert!(!response.is_error());
        assert_eq!(channel.calls(), vec!["answer S1".to_string()]);
    }

    #[tokio::test]
    async fn test_say_rejects_empty_text_before_side_effect() {
        let channel = Arc::new(MockChannel::default());
        let handler = SayHandler::new(channel.clone());

        let request = VerbRequest::new("S1", VerbParams::Say { text: "  ".into() });
        let err = handler.handle(&request).await.unwrap_err();

        assert!(matches!(err, HandlerError::Validation(_)));
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dtmf_digit_validation() {
        assert!(SendDtmfHandler::valid_digits("0123456789*#ABCD"));
        assert!(!SendDtmfHandler::valid_digits(""));
        assert!(!SendDtmfHandler::valid_digits("12E"));

        let channel = Arc::new(MockChannel::default());
        let handler = SendDtmfHandler::new(channel.clone());
        let request = VerbRequest::new(
            "S1",
            VerbParams::SendDtmf {
                digits: "hello".into(),
            },
        );
        assert!(handler.handle(&request).await.is_err());
        assert!(channel.calls().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_verb_params_rejected() {
        let channel = Arc::new(MockChannel::default());
        let handler = HangupHandler::new(channel.clone());

        let request = VerbRequest::new("S1", VerbParams::Answer);
        let err = handler.handle(&request).await.unwrap_err();
        assert!(matches!(err, HandlerError::WrongVerb { .. }));
        assert!(channel.calls().is_empty());
    }
}
