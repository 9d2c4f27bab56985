#![cfg(feature = "integration-tests")]

use anyhow::Result;
use async_nats::jetstream::{self, consumer::PullConsumer};
use common::domain::{ModelParameters, TranslationSettings};
use common::nats::{NatsClient, RedeliveryPolicy, StreamSpec};
use futures::StreamExt;
use std::time::Duration;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, Image};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use translate_worker::{TranslateWorker, TranslateWorkerConfig, TranslationJob};

/// NATS image with JetStream enabled
#[derive(Debug, Clone)]
struct NatsWithJetStream {
    ports: Vec<ContainerPort>,
}

impl Default for NatsWithJetStream {
    fn default() -> Self {
        Self {
            ports: vec![ContainerPort::Tcp(4222)],
        }
    }
}

impl Image for NatsWithJetStream {
    fn name(&self) -> &str {
        "nats"
    }

    fn tag(&self) -> &str {
        "latest"
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::seconds(3)]
    }

    fn cmd(&self) -> impl IntoIterator<Item = impl Into<std::borrow::Cow<'_, str>>> {
        vec!["--js"]
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &self.ports
    }
}

async fn start_nats() -> Result<(ContainerAsync<NatsWithJetStream>, String)> {
    let nats = NatsWithJetStream::default().start().await?;
    let host = nats.get_host().await?;
    let port = nats.get_host_port_ipv4(4222).await?;
    Ok((nats, format!("nats://{}:{}", host, port)))
}

fn document_event(id: &str, url: &str, mime_type: &str, size: u64) -> Vec<u8> {
    let document = serde_json::json!({ "url": url, "type": mime_type, "size": size });
    serde_json::to_vec(&serde_json::json!({
        "specversion": "1.0",
        "id": id,
        "type": "document-created",
        "time": "2024-03-01T10:00:00Z",
        "data": {
            "chainId": format!("chain-{}", id),
            "source": document.clone(),
            "document": document,
            "metadata": {}
        }
    }))
    .unwrap()
}

/// Replies to every sync translation request with one French document
async fn spawn_fake_sync_translator(nats_url: &str) -> Result<tokio::task::JoinHandle<()>> {
    let client = async_nats::connect(nats_url).await?;
    let mut requests = client.subscribe("translation.sync").await?;

    Ok(tokio::spawn(async move {
        while let Some(request) = requests.next().await {
            let body: serde_json::Value = match serde_json::from_slice(&request.payload) {
                Ok(body) => body,
                Err(_) => continue,
            };
            let source_url = body["event"]["data"]["document"]["url"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let reply = serde_json::json!({
                "documents": [{
                    "language": "fr",
                    "url": format!("{}.fr", source_url),
                    "type": "text/plain",
                    "size": 64
                }]
            });
            if let Some(reply_subject) = request.reply {
                let _ = client
                    .publish(reply_subject, serde_json::to_vec(&reply).unwrap().into())
                    .await;
            }
        }
    }))
}

async fn first_message_on(
    js: &jetstream::Context,
    stream: &str,
    subject: &str,
) -> Result<Option<jetstream::Message>> {
    let consumer: PullConsumer = js
        .get_stream(stream)
        .await?
        .create_consumer(jetstream::consumer::pull::Config {
            filter_subject: subject.to_string(),
            ..Default::default()
        })
        .await?;

    let mut messages = consumer
        .fetch()
        .max_messages(1)
        .expires(Duration::from_secs(5))
        .messages()
        .await?;

    messages
        .next()
        .await
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))
}

#[tokio::test]
async fn test_documents_are_routed_and_acknowledged() -> Result<()> {
    let (_nats, nats_url) = start_nats().await?;
    sleep(Duration::from_secs(2)).await;

    let nats_client = NatsClient::connect(&nats_url, Duration::from_secs(30)).await?;
    for stream in [
        StreamSpec::new("documents", "Inbound document events"),
        StreamSpec::new("translation_jobs", "Submitted translation jobs"),
        StreamSpec::new("translated_documents", "Events for translated documents"),
    ] {
        nats_client.ensure_stream(&stream).await?;
    }

    let translator = spawn_fake_sync_translator(&nats_url).await?;

    let settings =
        TranslationSettings::new(vec!["fr".to_string()], None, ModelParameters::default())?;
    let worker = TranslateWorker::new(
        &nats_client,
        settings,
        TranslateWorkerConfig {
            documents_stream: "documents".to_string(),
            documents_subject: "documents.>".to_string(),
            consumer_name: "translate-worker-it".to_string(),
            nats_batch_size: 10,
            nats_batch_wait_secs: 1,
            redelivery: RedeliveryPolicy::default(),
            batch_concurrency: 4,
            sync_translation_subject: "translation.sync".to_string(),
            sync_translation_timeout_secs: 5,
            translation_jobs_stream: "translation_jobs".to_string(),
            translated_documents_stream: "translated_documents".to_string(),
            service_name: "translate-it".to_string(),
        },
    )
    .await?;

    let token = CancellationToken::new();
    let mut handles = Vec::new();
    for (_, process) in worker.into_runner_processes() {
        handles.push(tokio::spawn(process(token.clone())));
    }

    let js = nats_client.jetstream();
    js.publish(
        "documents.created",
        document_event("small-1", "s3://in/notes.txt", "text/plain", 2048).into(),
    )
    .await?
    .await?;
    js.publish(
        "documents.created",
        document_event("large-1", "s3://in/manual.pdf", "application/pdf", 5 * 1024 * 1024).into(),
    )
    .await?
    .await?;

    // Let the worker fetch and settle the batch
    sleep(Duration::from_secs(5)).await;

    let translated = first_message_on(js, "translated_documents", "translated_documents.fr")
        .await?
        .expect("translated document event should be published");
    let translated_event: serde_json::Value = serde_json::from_slice(&translated.payload)?;
    assert_eq!(translated_event["id"], "small-1-fr");
    assert_eq!(translated_event["data"]["document"]["url"], "s3://in/notes.txt.fr");
    assert_eq!(translated_event["data"]["metadata"]["language"], "fr");

    let job_message = first_message_on(js, "translation_jobs", "translation_jobs.submitted")
        .await?
        .expect("translation job should be submitted");
    let job: TranslationJob = serde_json::from_slice(&job_message.payload)?;
    assert_eq!(job.job_id, "large-1");
    assert_eq!(job.settings.target_languages, vec!["fr".to_string()]);

    let mut documents_consumer: PullConsumer = js
        .get_stream("documents")
        .await?
        .get_consumer("translate-worker-it")
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let info = documents_consumer.info().await?;
    assert_eq!(info.num_ack_pending, 0, "both events should be acknowledged");
    assert_eq!(info.num_pending, 0);

    token.cancel();
    for handle in handles {
        handle.await??;
    }
    translator.abort();

    Ok(())
}

#[tokio::test]
async fn test_malformed_event_is_not_acknowledged() -> Result<()> {
    let (_nats, nats_url) = start_nats().await?;
    sleep(Duration::from_secs(2)).await;

    let nats_client = NatsClient::connect(&nats_url, Duration::from_secs(30)).await?;
    nats_client
        .ensure_stream(&StreamSpec::new("documents", "Inbound document events"))
        .await?;
    nats_client
        .ensure_stream(&StreamSpec::new("translation_jobs", "Submitted translation jobs"))
        .await?;

    let settings =
        TranslationSettings::new(vec!["de".to_string()], None, ModelParameters::default())?;
    let worker = TranslateWorker::new(
        &nats_client,
        settings,
        TranslateWorkerConfig {
            documents_stream: "documents".to_string(),
            documents_subject: "documents.>".to_string(),
            consumer_name: "translate-worker-malformed".to_string(),
            nats_batch_size: 10,
            nats_batch_wait_secs: 1,
            redelivery: RedeliveryPolicy::default(),
            batch_concurrency: 2,
            sync_translation_subject: "translation.sync".to_string(),
            sync_translation_timeout_secs: 1,
            translation_jobs_stream: "translation_jobs".to_string(),
            translated_documents_stream: "translated_documents".to_string(),
            service_name: "translate-it".to_string(),
        },
    )
    .await?;

    let token = CancellationToken::new();
    let mut handles = Vec::new();
    for (_, process) in worker.into_runner_processes() {
        handles.push(tokio::spawn(process(token.clone())));
    }

    let js = nats_client.jetstream();
    js.publish("documents.created", "{not json".into()).await?.await?;
    js.publish(
        "documents.created",
        document_event("large-2", "s3://in/scan.png", "image/png", 10).into(),
    )
    .await?
    .await?;

    sleep(Duration::from_secs(4)).await;
    token.cancel();
    for handle in handles {
        handle.await??;
    }

    // The job for the valid sibling was submitted despite the bad event
    let job_message = first_message_on(js, "translation_jobs", "translation_jobs.submitted")
        .await?
        .expect("job for valid sibling should be submitted");
    let job: TranslationJob = serde_json::from_slice(&job_message.payload)?;
    assert_eq!(job.job_id, "large-2");

    // The malformed event was nak'd and is still pending redelivery
    let mut documents_consumer: PullConsumer = js
        .get_stream("documents")
        .await?
        .get_consumer("translate-worker-malformed")
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    let info = documents_consumer.info().await?;
    assert!(info.num_ack_pending + info.num_pending as usize >= 1);

    Ok(())
}
