//! Mock PDF and model backends for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::{BackendError, PdfBackend};
use crate::client::{ModelBackend, ModelError};
use crate::record::SCHEMA_FIELDS;

/// A schema-conformant response with the given first author.
pub fn valid_response(first_author: &str) -> String {
    let body: Vec<String> = SCHEMA_FIELDS
        .iter()
        .map(|f| {
            let value = if *f == "first_author" {
                first_author.to_string()
            } else {
                "Not reported".to_string()
            };
            format!("\"{f}\": \"{value}\"")
        })
        .collect();
    format!("{{{}}}", body.join(", "))
}

/// PDF backend that treats the input bytes as UTF-8 text.
pub struct MockPdf {
    fail_on: Vec<String>,
}

impl MockPdf {
    /// Return every document's bytes as its text.
    pub fn echo() -> Self {
        Self {
            fail_on: Vec::new(),
        }
    }

    /// Fail with an extraction error for documents whose bytes equal one of `texts`.
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            fail_on: texts.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl PdfBackend for MockPdf {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, BackendError> {
        let text = String::from_utf8_lossy(bytes).to_string();
        if self.fail_on.contains(&text) {
            return Err(BackendError::OpenError("corrupt xref table".into()));
        }
        Ok(text)
    }
}

/// A configurable reply for [`MockModel`].
pub enum MockReply {
    Text(String),
    Error(ModelError),
}

/// Model backend returning canned replies.
///
/// Replies are consumed in order; once the sequence is exhausted the
/// fallback is repeated.
pub struct MockModel {
    replies: Mutex<Vec<MockReply>>,
    fallback: String,
    call_count: AtomicUsize,
    last_user: Mutex<Option<String>>,
}

impl MockModel {
    /// Always reply with `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self::with_sequence(vec![reply])
    }

    /// Reply with each entry of `replies` in turn.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        let fallback = match replies.last() {
            Some(MockReply::Text(t)) => t.clone(),
            _ => String::new(),
        };
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            fallback,
            call_count: AtomicUsize::new(0),
            last_user: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_user_message(&self) -> Option<String> {
        self.last_user.lock().unwrap().clone()
    }
}

impl ModelBackend for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete<'a>(
        &'a self,
        _system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + 'a>> {
        Box::pin(async move {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            *self.last_user.lock().unwrap() = Some(user.to_string());
            match self.replies.lock().unwrap().pop() {
                Some(MockReply::Text(t)) => Ok(t),
                Some(MockReply::Error(e)) => Err(e),
                None => Ok(self.fallback.clone()),
            }
        })
    }
}
