use std::sync::Arc;

use anyhow::Context;

use xflow::dsl::{parse_dsl, DslFormat};
use xflow::core::TracingTransactionSink;
use xflow::{create_event_channel, ErrorReport, FlowEvent, FlowRunner, RunInputs, RuntimeConfig};

const DEMO_FLOW: &str = r#"
id: demo
nodes:
  - id: chat_in
    data:
      type: ChatInput
      node:
        display_name: Chat Input
        template:
          input_value: {type: str, value: ""}
          code:
            type: code
            value: |
              class ChatInput {
                build() { return Message(this.input_value, "User"); }
              }
  - id: shout
    data:
      type: Shout
      node:
        display_name: Shout
        template:
          text: {type: str, value: ""}
          suffix: {type: str, value: "!"}
          code:
            type: code
            value: |
              const b64 = require("base64");
              class Shout {
                build() {
                  console.log("shouting", this.text.length, "chars");
                  return this.text.toUpperCase() + this.suffix;
                }
                encoded() { return b64.encode(this.text); }
              }
        outputs:
          - {name: text, method: build}
          - {name: encoded, method: encoded}
  - id: chat_out
    data:
      type: ChatOutput
      node:
        display_name: Chat Output
        template:
          input_value: {type: str, value: ""}
          stream: {type: bool, value: false}
          code:
            type: code
            value: |
              class ChatOutput {
                *build() {
                  for (const word of String(this.input_value).split(" ")) {
                    yield word + " ";
                  }
                }
              }
edges:
  - {source: chat_in, target: shout, target_input: text}
  - {source: shout, source_output: text, target: chat_out, target_input: input_value}
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== xflow runtime ===\n");

    let schema = parse_dsl(DEMO_FLOW, DslFormat::Yaml).context("failed to parse demo flow")?;
    println!(
        "[OK] flow parsed ({} nodes, {} edges)",
        schema.nodes.len(),
        schema.edges.len()
    );

    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;
    println!("[OK] isolation level: {}", config.isolation_level);

    let tweaks = serde_json::from_value(serde_json::json!({ "Shout": { "suffix": "!!!" } }))?;
    let (sender, mut receiver) = create_event_channel();
    let runner = FlowRunner::builder(schema)
        .config(config)
        .inputs(RunInputs::chat("hello from xflow"))
        .tweaks(tweaks)
        .event_sender(sender)
        .transaction_sink(Arc::new(TracingTransactionSink))
        .build();

    for diagnostic in runner.validate() {
        println!("[{}] {}", diagnostic.code, diagnostic.message);
    }

    let outputs = match runner.run_async().await {
        Ok(outputs) => outputs,
        Err(failure) => {
            for output in &failure.completed {
                println!("  built before failure: {}", output.vertex_id);
            }
            let report = ErrorReport::from(&failure.error);
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Err(failure.error).context("flow run failed");
        }
    };

    for output in &outputs {
        println!("\n[{}] {}", output.vertex_id, output.display_name);
        for value in &output.outputs {
            println!("  {} ({:?}) = {}", value.name, value.artifact.kind, value.value);
        }
        for line in &output.logs {
            println!("  log: {}", line);
        }
    }

    drop(runner);
    while let Some(event) = receiver.recv().await {
        if let FlowEvent::StreamChunk { index, chunk, .. } = event {
            println!("  stream chunk {}: {}", index, chunk);
        }
    }

    Ok(())
}
