//! `WS /chat/ws`: a bidirectional socket where each text frame is one
//! question and responses are streamed back as token frames.
//!
//! No teacher module shows a websocket handler (its `tokio-tungstenite`
//! dependency is otherwise unused); this is built from Axum's `ws` idiom
//! directly, reusing the same retrieval/answerer/chat wiring as `POST
//! /chat/ask`.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::StreamExt;
use uuid::Uuid;

use super::AppState;
use crate::llm::{assistant_message, user_message, Message};
use crate::models::{ChatMessage, MessageRole};
use crate::vectorstore::SearchFilter;

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn history_as_messages(messages: Vec<ChatMessage>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|m| match m.role {
            MessageRole::User => user_message(m.content),
            MessageRole::Assistant => assistant_message(m.content),
        })
        .collect()
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let session = match state.chat.create_session(Uuid::nil()).await {
        Ok(session) => session,
        Err(err) => {
            let _ = socket
                .send(WsMessage::Text(format!("error: {err}").into()))
                .await;
            return;
        }
    };

    while let Some(Ok(message)) = socket.recv().await {
        let question = match message {
            WsMessage::Text(text) => text.to_string(),
            WsMessage::Close(_) => break,
            _ => continue,
        };
        if question.trim().is_empty() {
            continue;
        }

        let history = match state.chat.get_messages(session.id, 10).await {
            Ok(messages) => history_as_messages(messages),
            Err(err) => {
                let _ = socket
                    .send(WsMessage::Text(format!("error: {err}").into()))
                    .await;
                continue;
            }
        };

        let retrieval = match state
            .retrieval
            .semantic_search(&question, 5, None, &SearchFilter::default(), None, true, 0.5)
            .await
        {
            Ok(r) => r,
            Err(err) => {
                let _ = socket
                    .send(WsMessage::Text(format!("error: {err}").into()))
                    .await;
                continue;
            }
        };

        let model = state.config.llm_model.clone();
        let mut stream = match state
            .rag
            .answer_stream(
                &question,
                &model,
                &retrieval.hits,
                &history,
                crate::rag::DEFAULT_CONTEXT_CHAR_BUDGET,
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                let _ = socket
                    .send(WsMessage::Text(format!("error: {err}").into()))
                    .await;
                continue;
            }
        };

        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    answer.push_str(&text);
                    if socket.send(WsMessage::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = socket
                        .send(WsMessage::Text(format!("error: {err}").into()))
                        .await;
                    break;
                }
            }
        }

        if !answer.is_empty() {
            if let Err(err) = state.chat.add_turn(session.id, &question, &answer).await {
                tracing::warn!(%err, "failed to persist websocket chat turn");
            }
        }
    }
}
