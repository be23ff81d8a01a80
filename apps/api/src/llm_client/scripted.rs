//! Scripted `ContentModel` used by the test suite.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::{stream, StreamExt};

use super::{ContentModel, LlmError, ModelRequest, TextStream};

#[derive(Debug, Clone)]
pub enum Script {
    /// Yields the chunks, then ends normally.
    Chunks(Vec<String>),
    /// The call itself fails before any stream exists.
    FailToOpen,
    /// Yields the chunks, then a stream error.
    FailMidStream(Vec<String>),
    /// Yields the chunks, then never ends.
    Stall(Vec<String>),
}

pub struct ScriptedModel {
    script: Script,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Splits `output` into chunks of `size` characters.
    pub fn chunked(output: &str, size: usize) -> Self {
        let chars: Vec<char> = output.chars().collect();
        let chunks = chars
            .chunks(size.max(1))
            .map(|c| c.iter().collect::<String>())
            .collect();
        Self::new(Script::Chunks(chunks))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentModel for ScriptedModel {
    async fn stream(&self, request: ModelRequest) -> Result<TextStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let ok = |chunks: &Vec<String>| {
            stream::iter(chunks.clone().into_iter().map(Ok::<String, LlmError>))
        };
        match &self.script {
            Script::Chunks(chunks) => Ok(Box::pin(ok(chunks))),
            Script::FailToOpen => Err(LlmError::Api {
                status: 529,
                message: "Overloaded".to_string(),
            }),
            Script::FailMidStream(chunks) => Ok(Box::pin(ok(chunks).chain(stream::once(
                async { Err(LlmError::Stream("connection reset".to_string())) },
            )))),
            Script::Stall(chunks) => Ok(Box::pin(ok(chunks).chain(stream::pending()))),
        }
    }
}
