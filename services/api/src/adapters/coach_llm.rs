//! services/api/src/adapters/coach_llm.rs
//!
//! This module contains the adapter for the coach conversation LLM.
//! It implements the `CoachModelService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use momentbox_core::ports::{CoachModelService, PhotoAttachment, PortError, PortResult};
use momentbox_core::session::ChatTurn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CoachModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCoachAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCoachAdapter {
    /// Creates a new `OpenAiCoachAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Maps stored history turns onto chat-completion messages. The "model"
    /// role becomes an assistant message; blob parts are dropped because the
    /// image bytes are only sent on the turn that introduced them.
    fn history_messages(history: &[ChatTurn]) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(history.len());
        for turn in history {
            let text = turn.text_content();
            let message: ChatCompletionRequestMessage = if turn.role == "model" {
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into()
            } else {
                ChatCompletionRequestUserMessageArgs::default()
                    .content(text)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into()
            };
            messages.push(message);
        }
        Ok(messages)
    }

    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream(e.to_string()))?;

        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content.trim().to_string())
            } else {
                Err(PortError::Upstream(
                    "Coach LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Upstream(
                "Coach LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}

//=========================================================================================
// `CoachModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CoachModelService for OpenAiCoachAdapter {
    /// Continues a conversation: the stored history plus the user's new input.
    async fn chat(&self, history: &[ChatTurn], input: &str) -> PortResult<String> {
        let mut messages = Self::history_messages(history)?;
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(input)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
        self.complete(messages).await
    }

    /// A single unchained turn about one photo. The image travels inline as
    /// a base64 data URL next to the prompt text.
    async fn photo_turn(
        &self,
        prompt: &str,
        image: Option<PhotoAttachment>,
    ) -> PortResult<String> {
        let message: ChatCompletionRequestMessage = match image {
            Some(attachment) => {
                let data_url = format!(
                    "data:{};base64,{}",
                    attachment.mime_type,
                    BASE64.encode(&attachment.bytes)
                );
                let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(prompt)
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(data_url)
                                .build()
                                .map_err(|e| PortError::Unexpected(e.to_string()))?,
                        )
                        .build()
                        .map_err(|e| PortError::Unexpected(e.to_string()))?
                        .into(),
                ];
                ChatCompletionRequestUserMessageArgs::default()
                    .content(parts)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into()
            }
            None => ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        };
        self.complete(vec![message]).await
    }

    /// One-shot generation with no conversation state.
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into();
        self.complete(vec![message]).await
    }
}
