//! Streaming completion dispatcher (§4.5): decodes a request, reserves an
//! engine, drives generation, and either assembles a single JSON response or
//! emits SSE chunks with TTFT tracking, backpressure, and cancellation.

use std::{
    sync::{atomic::{AtomicU64, Ordering}, Arc},
    time::{Duration, Instant},
};

use axum::response::{
    sse::{Event, Sse},
    IntoResponse, Response,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{
        collaborator::{EngineLoader, GenerationInput, GenerationRequest, GenerationStats, TokenEvent},
        manager::NodeManager,
        record::EngineHandle,
    },
    error::GatewayError,
    metrics::aggregator::{EngineMetrics, MetricsAggregator},
    models::{
        chat::{ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatDelta, ChatMessage},
        common::{generate_id, unix_now, Usage},
        completion::{CompletionChoice, CompletionChunk, CompletionChunkChoice, CompletionRequest, CompletionResponse},
    },
};

use super::sse::{done_event, to_sse_event, CancellableSseStream};

const SYSTEM_FINGERPRINT: &str = "fp_cortex_gateway";
const NO_TTFT_RECORDED: u64 = u64::MAX;

pub async fn dispatch_chat(
    node_manager: &NodeManager,
    metrics: &MetricsAggregator,
    request_timeout: Duration,
    request: ChatCompletionRequest,
) -> Result<Response, GatewayError> {
    request.validate()?;
    let model = request.model.clone();
    let handle = node_manager.get_or_load(&model).await?;
    let loader = node_manager.loader();
    let engine_metrics = metrics.for_engine(&model);

    let gen_request = GenerationRequest {
        input: GenerationInput::Chat {
            messages: request
                .messages
                .iter()
                .map(|m| (m.role.clone(), m.content.clone()))
                .collect(),
        },
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        seed: request.seed,
    };

    if request.is_streaming() {
        Ok(stream_chat(loader, handle, gen_request, engine_metrics, model))
    } else {
        let fut = collect_chat(loader, handle, gen_request, engine_metrics, model);
        match tokio::time::timeout(request_timeout, fut).await {
            Ok(result) => Ok(axum::Json(result?).into_response()),
            Err(_) => Err(GatewayError::EngineRuntime("request timed out".into())),
        }
    }
}

pub async fn dispatch_completion(
    node_manager: &NodeManager,
    metrics: &MetricsAggregator,
    request_timeout: Duration,
    request: CompletionRequest,
) -> Result<Response, GatewayError> {
    request.validate()?;
    let model = request.model.clone();
    let handle = node_manager.get_or_load(&model).await?;
    let loader = node_manager.loader();
    let engine_metrics = metrics.for_engine(&model);
    let prompts = request.prompt.as_vec();

    if request.is_streaming() {
        // A streaming response carries one choice stream; only the first
        // prompt is honored when `prompt` is an array (§4.5 is specified in
        // terms of a single generation loop per request).
        let gen_request = GenerationRequest {
            input: GenerationInput::Completion {
                prompt: prompts.into_iter().next().unwrap_or_default(),
            },
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            seed: request.seed,
        };
        Ok(stream_completion(loader, handle, gen_request, engine_metrics, model))
    } else {
        let fut = collect_completion(loader, handle, prompts, request.max_tokens, request.temperature, request.top_p, request.seed, engine_metrics, model);
        match tokio::time::timeout(request_timeout, fut).await {
            Ok(result) => Ok(axum::Json(result?).into_response()),
            Err(_) => Err(GatewayError::EngineRuntime("request timed out".into())),
        }
    }
}

async fn collect_chat(
    loader: Arc<dyn EngineLoader>,
    handle: EngineHandle,
    gen_request: GenerationRequest,
    metrics: Arc<EngineMetrics>,
    model: String,
) -> Result<ChatCompletionResponse, GatewayError> {
    metrics.record_request_started();
    let t_start = Instant::now();
    let cancel = CancellationToken::new();
    let (token_tx, mut token_rx) = mpsc::channel(32);

    let gen_fut = loader.generate(handle, gen_request, token_tx, cancel);
    let collect_fut = async {
        let mut content = String::new();
        let mut finish_reason = "stop".to_string();
        while let Some(event) = token_rx.recv().await {
            if event.is_final {
                if let Some(reason) = event.finish_reason {
                    finish_reason = reason;
                }
                break;
            }
            content.push_str(&event.delta);
        }
        (content, finish_reason)
    };

    let (gen_result, (content, finish_reason)) = tokio::join!(gen_fut, collect_fut);
    let turnaround_ms = t_start.elapsed().as_millis() as u64;

    let stats = gen_result.map_err(|err| {
        metrics.record_failure();
        err
    })?;
    metrics.record_completion(stats.input_tokens, stats.output_tokens, turnaround_ms, turnaround_ms);

    Ok(ChatCompletionResponse {
        id: generate_id("chatcmpl-"),
        object: "chat.completion",
        created: unix_now(),
        model,
        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some(finish_reason),
        }],
        usage: Usage::new(stats.input_tokens, stats.output_tokens),
    })
}

#[allow(clippy::too_many_arguments)]
async fn collect_completion(
    loader: Arc<dyn EngineLoader>,
    handle: EngineHandle,
    prompts: Vec<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    seed: Option<i64>,
    metrics: Arc<EngineMetrics>,
    model: String,
) -> Result<CompletionResponse, GatewayError> {
    metrics.record_request_started();
    let t_start = Instant::now();

    let mut choices = Vec::with_capacity(prompts.len());
    let mut total_input = 0u64;
    let mut total_output = 0u64;

    for (index, prompt) in prompts.into_iter().enumerate() {
        let gen_request = GenerationRequest {
            input: GenerationInput::Completion { prompt },
            max_tokens,
            temperature,
            top_p,
            seed,
        };
        let cancel = CancellationToken::new();
        let (token_tx, mut token_rx) = mpsc::channel(32);
        let gen_fut = loader.generate(handle, gen_request, token_tx, cancel);
        let collect_fut = async {
            let mut text = String::new();
            let mut finish_reason = "stop".to_string();
            while let Some(event) = token_rx.recv().await {
                if event.is_final {
                    if let Some(reason) = event.finish_reason {
                        finish_reason = reason;
                    }
                    break;
                }
                text.push_str(&event.delta);
            }
            (text, finish_reason)
        };

        let (gen_result, (text, finish_reason)) = tokio::join!(gen_fut, collect_fut);
        let stats: GenerationStats = gen_result.map_err(|err| {
            metrics.record_failure();
            err
        })?;
        total_input += stats.input_tokens;
        total_output += stats.output_tokens;
        choices.push(CompletionChoice {
            index: index as u32,
            text,
            finish_reason: Some(finish_reason),
        });
    }

    let turnaround_ms = t_start.elapsed().as_millis() as u64;
    metrics.record_completion(total_input, total_output, turnaround_ms, turnaround_ms);

    Ok(CompletionResponse {
        id: generate_id("cmpl-"),
        object: "text_completion",
        created: unix_now(),
        model,
        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
        choices,
        usage: Usage::new(total_input, total_output),
    })
}

fn stream_chat(
    loader: Arc<dyn EngineLoader>,
    handle: EngineHandle,
    gen_request: GenerationRequest,
    metrics: Arc<EngineMetrics>,
    model: String,
) -> Response {
    metrics.record_request_started();
    let id = generate_id("chatcmpl-");
    let created = unix_now();
    let cancel = CancellationToken::new();
    let (token_tx, mut token_rx) = mpsc::channel::<TokenEvent>(32);
    let (sse_tx, sse_rx) = mpsc::channel::<Result<Event, std::convert::Infallible>>(32);

    let gen_cancel = cancel.clone();
    tokio::spawn(async move {
        let t_start = Instant::now();
        let ttft_ms = Arc::new(AtomicU64::new(NO_TTFT_RECORDED));

        let gen_fut = loader.generate(handle, gen_request, token_tx, gen_cancel);
        let forward_fut = {
            let ttft_ms = Arc::clone(&ttft_ms);
            let sse_tx = sse_tx.clone();
            let id = id.clone();
            let model = model.clone();
            async move {
                while let Some(event) = token_rx.recv().await {
                    if !event.is_final && ttft_ms.load(Ordering::Relaxed) == NO_TTFT_RECORDED {
                        ttft_ms.store(t_start.elapsed().as_millis() as u64, Ordering::Relaxed);
                    }
                    let delta = if event.is_final {
                        ChatDelta::default()
                    } else {
                        ChatDelta {
                            role: None,
                            content: Some(event.delta.clone()),
                        }
                    };
                    let chunk = ChatCompletionChunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model: model.clone(),
                        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
                        choices: vec![ChatChunkChoice {
                            index: 0,
                            delta,
                            finish_reason: event.finish_reason.clone(),
                        }],
                    };
                    if sse_tx.send(Ok(to_sse_event(&chunk))).await.is_err() {
                        return;
                    }
                    if event.is_final {
                        let _ = sse_tx.send(Ok(done_event())).await;
                        return;
                    }
                }
            }
        };

        let (gen_result, ()) = tokio::join!(gen_fut, forward_fut);
        record_outcome(&metrics, gen_result, t_start, &ttft_ms);
    });

    let stream = CancellableSseStream::new(ReceiverStream::new(sse_rx), cancel);
    Sse::new(stream).into_response()
}

fn stream_completion(
    loader: Arc<dyn EngineLoader>,
    handle: EngineHandle,
    gen_request: GenerationRequest,
    metrics: Arc<EngineMetrics>,
    model: String,
) -> Response {
    metrics.record_request_started();
    let id = generate_id("cmpl-");
    let created = unix_now();
    let cancel = CancellationToken::new();
    let (token_tx, mut token_rx) = mpsc::channel::<TokenEvent>(32);
    let (sse_tx, sse_rx) = mpsc::channel::<Result<Event, std::convert::Infallible>>(32);

    let gen_cancel = cancel.clone();
    tokio::spawn(async move {
        let t_start = Instant::now();
        let ttft_ms = Arc::new(AtomicU64::new(NO_TTFT_RECORDED));

        let gen_fut = loader.generate(handle, gen_request, token_tx, gen_cancel);
        let forward_fut = {
            let ttft_ms = Arc::clone(&ttft_ms);
            let sse_tx = sse_tx.clone();
            let id = id.clone();
            let model = model.clone();
            async move {
                while let Some(event) = token_rx.recv().await {
                    if !event.is_final && ttft_ms.load(Ordering::Relaxed) == NO_TTFT_RECORDED {
                        ttft_ms.store(t_start.elapsed().as_millis() as u64, Ordering::Relaxed);
                    }
                    let chunk = CompletionChunk {
                        id: id.clone(),
                        object: "text_completion.chunk",
                        created,
                        model: model.clone(),
                        system_fingerprint: SYSTEM_FINGERPRINT.to_string(),
                        choices: vec![CompletionChunkChoice {
                            index: 0,
                            text: event.delta.clone(),
                            finish_reason: event.finish_reason.clone(),
                        }],
                    };
                    if sse_tx.send(Ok(to_sse_event(&chunk))).await.is_err() {
                        return;
                    }
                    if event.is_final {
                        let _ = sse_tx.send(Ok(done_event())).await;
                        return;
                    }
                }
            }
        };

        let (gen_result, ()) = tokio::join!(gen_fut, forward_fut);
        record_outcome(&metrics, gen_result, t_start, &ttft_ms);
    });

    let stream = CancellableSseStream::new(ReceiverStream::new(sse_rx), cancel);
    Sse::new(stream).into_response()
}

fn record_outcome(
    metrics: &EngineMetrics,
    gen_result: Result<GenerationStats, GatewayError>,
    t_start: Instant,
    ttft_ms: &AtomicU64,
) {
    let turnaround_ms = t_start.elapsed().as_millis() as u64;
    match gen_result {
        Ok(stats) => {
            let ttft = ttft_ms.load(Ordering::Relaxed);
            let ttft = if ttft == NO_TTFT_RECORDED { 0 } else { ttft };
            metrics.record_ttft(ttft);
            let output_gen_ms = turnaround_ms.saturating_sub(ttft);
            metrics.record_completion(stats.input_tokens, stats.output_tokens, turnaround_ms, output_gen_ms);
        }
        Err(_) => metrics.record_failure(),
    }
}
