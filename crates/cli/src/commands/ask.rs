//! Ask command handler.
//!
//! Runs one turn through the session pipeline and prints the answer,
//! streaming tokens to stdout as they arrive.

use super::{print_json, session_pipeline};
use clap::Args;
use relay_core::{config::AppConfig, AppResult};
use relay_pipeline::{TurnEvent, TurnInput};
use std::io::Write;
use tokio::sync::mpsc;

/// Ask one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Session id scoping conversation history
    #[arg(short, long)]
    pub session: Option<String>,

    /// Chat thread id (takes precedence over --session for history)
    #[arg(long)]
    pub thread: Option<String>,

    /// Free-form context passed to every source
    #[arg(long)]
    pub context: Option<String>,

    /// Print the answer only once it is complete
    #[arg(long)]
    pub no_stream: bool,

    /// Output the answer, session and source results as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let pipeline = session_pipeline(config)?;
        pipeline.initialize().await;

        let input = TurnInput {
            question: self.question.clone(),
            user_session_id: self.session.clone(),
            chat_thread_id: self.thread.clone(),
            context: self.context.clone(),
            stream: !self.no_stream && !self.json,
        };

        let result = if self.json {
            match pipeline.invoke(input).await {
                Ok(output) => print_json(&serde_json::json!({
                    "answer": output.answer,
                    "sessionId": output.session_id,
                    "runId": output.run_id,
                    "sources": pipeline.kinds(),
                    "context": output.context,
                })),
                Err(e) => Err(e),
            }
        } else {
            let (events, mut received) = mpsc::channel(64);
            let print = async {
                let mut streamed = false;
                let mut outcome = Ok(());
                while let Some(event) = received.recv().await {
                    match event {
                        TurnEvent::Token(token) => {
                            streamed = true;
                            print!("{}", token);
                            std::io::stdout().flush().ok();
                        }
                        TurnEvent::Message(text) => {
                            if streamed {
                                println!();
                            } else {
                                println!("{}", text);
                            }
                        }
                        TurnEvent::End(reason) => tracing::debug!(reason = %reason, "Turn ended"),
                        TurnEvent::Error(e) => outcome = Err(e),
                    }
                }
                outcome
            };

            let ((), outcome) = tokio::join!(pipeline.call(input, events), print);
            outcome
        };

        pipeline.shutdown().await;
        result
    }
}
