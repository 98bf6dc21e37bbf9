use crate::audio::{AudioFormat, MicDriver, playback};
use crate::config::Config;
use crate::ranking::Ranker;
use crate::services::{Recorder, RecorderHandle};
use crate::session::{CaptureError, format_elapsed};
use crate::submission::{SubmissionClient, SubmissionError, SubmissionOutcome};
use crate::view::{Mode, ResultView, ViewState};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// A completed submission task reporting back: the epoch token it was
/// started under plus what came of it.
type OutcomeMessage = (u64, Result<SubmissionOutcome, SubmissionError>);

#[derive(Debug, PartialEq)]
enum Command {
    Mode(Mode),
    Url(String),
    Record,
    Stop,
    Again,
    Play,
    Submit,
    Status,
    Help,
    Quit,
}

/// One shell line to a command. `Ok(None)` for a blank line, `Err` carries
/// the notice to print for unusable input.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        "mode" => match rest {
            "url" => Ok(Some(Command::Mode(Mode::Url))),
            "audio" => Ok(Some(Command::Mode(Mode::Audio))),
            _ => Err("usage: mode url|audio".to_string()),
        },
        "url" => Ok(Some(Command::Url(rest.to_string()))),
        "record" => Ok(Some(Command::Record)),
        "stop" => Ok(Some(Command::Stop)),
        "again" => Ok(Some(Command::Again)),
        "play" => Ok(Some(Command::Play)),
        "submit" => Ok(Some(Command::Submit)),
        "status" => Ok(Some(Command::Status)),
        "help" => Ok(Some(Command::Help)),
        "quit" | "exit" => Ok(Some(Command::Quit)),
        other => Err(format!("unknown command: {} (try 'help')", other)),
    }
}

pub struct App {
    config: Config,
    view: ViewState,
    recorder: RecorderHandle,
    client: Arc<SubmissionClient>,
    ranker: Ranker,
    url_input: String,
    busy: bool,
    outcome_tx: mpsc::Sender<OutcomeMessage>,
    outcome_rx: mpsc::Receiver<OutcomeMessage>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(SubmissionClient::new(
            &config.server_url,
            Duration::from_secs(config.timeout_secs),
        )?);
        let recorder = Self::setup_audio_pipeline(&config);
        let (outcome_tx, outcome_rx) = mpsc::channel(10);

        Ok(Self {
            config,
            view: ViewState::new(),
            recorder,
            client,
            ranker: Ranker::new(),
            url_input: String::new(),
            busy: false,
            outcome_tx,
            outcome_rx,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        println!("earmark: identify a song from a link or a quick capture");
        print_help();

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => return Err(e.into()),
                    }
                }

                Some((token, result)) = self.outcome_rx.recv() => {
                    self.finish_submission(token, result);
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        tracing::info!("Shutdown complete");
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> bool {
        match parse_command(line) {
            Ok(Some(command)) => self.handle_command(command).await,
            Ok(None) => true,
            Err(notice) => {
                println!("{}", notice);
                true
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Help => print_help(),
            Command::Mode(mode) => self.switch_mode(mode),
            Command::Url(link) => {
                self.url_input = link;
                if self.url_input.is_empty() {
                    println!("URL cleared");
                } else {
                    println!("URL set to {}", self.url_input);
                }
            }
            Command::Record => self.handle_record().await,
            Command::Stop => self.handle_stop().await,
            Command::Again => self.handle_again().await,
            Command::Play => self.handle_play().await,
            Command::Submit => self.handle_submit().await,
            Command::Status => self.handle_status().await,
        }

        true
    }

    fn switch_mode(&mut self, mode: Mode) {
        if self.view.set_mode(mode) {
            println!("mode: {}", mode.as_str());
        } else {
            println!("already in {} mode", mode.as_str());
        }
    }

    async fn handle_record(&mut self) {
        match self.recorder.start().await {
            Ok(()) => println!("recording... type 'stop' to finish"),
            Err(CaptureError::Permission(reason)) => {
                println!(
                    "could not access the microphone ({}); check permissions and try again",
                    reason
                );
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn handle_stop(&mut self) {
        match self.recorder.stop().await {
            Ok(artifact) => {
                let elapsed = match self.recorder.status().await {
                    Ok(status) => format_elapsed(status.elapsed_secs),
                    Err(_) => format_elapsed(0),
                };
                println!(
                    "recording complete: {} captured ({} bytes)",
                    elapsed,
                    artifact.len()
                );
                println!("'play' to preview, 'submit' to identify, 'again' to discard");
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn handle_again(&mut self) {
        match self.recorder.discard().await {
            Ok(()) => println!("recording discarded; 'record' to capture a new take"),
            Err(e) => println!("{}", e),
        }
    }

    async fn handle_play(&mut self) {
        if !self.config.preview_playback {
            println!("preview playback is disabled in config");
            return;
        }

        match self.recorder.artifact().await {
            Ok(Some(artifact)) => {
                println!("previewing recording...");
                playback::preview(artifact).await;
            }
            Ok(None) => println!("no finished recording to play"),
            Err(e) => println!("{}", e),
        }
    }

    /// Dispatch the active mode's input as a background task. Only one
    /// submission may be outstanding; capture commands and mode switching
    /// stay usable while it runs.
    async fn handle_submit(&mut self) {
        if self.busy {
            println!("a submission is already in flight");
            return;
        }

        match self.view.active_mode() {
            Mode::Url => {
                if self.url_input.trim().is_empty() {
                    println!("enter a URL before submitting (use 'url <link>')");
                    return;
                }

                let token = self.view.begin_submission();
                let client = self.client.clone();
                let tx = self.outcome_tx.clone();
                let url = self.url_input.clone();
                tokio::spawn(async move {
                    let result = client.submit_url(&url).await;
                    let _ = tx.send((token, result)).await;
                });
            }
            Mode::Audio => {
                let artifact = match self.recorder.artifact().await {
                    Ok(Some(artifact)) if !artifact.is_empty() => artifact,
                    Ok(_) => {
                        println!("record a clip before submitting");
                        return;
                    }
                    Err(e) => {
                        println!("{}", e);
                        return;
                    }
                };

                let token = self.view.begin_submission();
                let client = self.client.clone();
                let tx = self.outcome_tx.clone();
                tokio::spawn(async move {
                    let result = client.submit_audio(Some(&artifact)).await;
                    let _ = tx.send((token, result)).await;
                });
            }
        }

        self.busy = true;
        println!("submitting...");
    }

    fn finish_submission(&mut self, token: u64, result: Result<SubmissionOutcome, SubmissionError>) {
        self.busy = false;

        match result {
            Ok(outcome) => {
                if self.view.apply_outcome(token, outcome) {
                    self.render_outcome();
                } else {
                    tracing::debug!("Discarding outcome from a superseded submission");
                }
            }
            Err(SubmissionError::Validation(notice)) => {
                if self.view.is_current(token) {
                    println!("{}", notice);
                }
            }
        }
    }

    fn render_outcome(&self) {
        match self.view.view() {
            ResultView::Matches(audio) => {
                let ranked = self.ranker.rank(audio);
                println!(
                    "found {} match{}:",
                    ranked.len(),
                    if ranked.len() == 1 { "" } else { "es" }
                );
                for (i, ranked_candidate) in ranked.iter().enumerate() {
                    let c = &ranked_candidate.candidate;
                    println!(
                        "  {}. {} by {} ({:.1}% confidence)",
                        i + 1,
                        c.title,
                        c.channel,
                        ranked_candidate.confidence_percent
                    );
                    println!(
                        "     matched {:.1}s in, source {}",
                        c.time_offset_secs, c.source_url
                    );
                    if let Some(embed) = self.ranker.embed_reference(&c.source_url) {
                        println!("     embed {}", embed);
                    }
                }
            }
            ResultView::NoMatch(audio) => match &audio.error_message {
                Some(reason) => println!("no match found: {}", reason),
                None => println!("no match found"),
            },
            ResultView::UrlResult(url) => {
                if url.is_registered() {
                    let title = url.title.as_deref().unwrap_or("(untitled)");
                    match &url.song_id {
                        Some(id) => println!("registered: {} (song id {})", title, id),
                        None => println!("registered: {}", title),
                    }
                } else {
                    println!("server replied: {}", url.status);
                }
            }
            ResultView::Failure(message) => {
                println!("submission failed: {}; retry with the same input", message);
            }
            ResultView::Nothing => {}
        }
    }

    async fn handle_status(&mut self) {
        println!("mode: {}", self.view.active_mode().as_str());
        if self.url_input.is_empty() {
            println!("url: (not set)");
        } else {
            println!("url: {}", self.url_input);
        }

        match self.recorder.status().await {
            Ok(status) => {
                println!(
                    "capture: {} ({})",
                    status.state,
                    format_elapsed(status.elapsed_secs)
                );
                if status.artifact_bytes > 0 {
                    println!("artifact: {} bytes", status.artifact_bytes);
                }
            }
            Err(e) => println!("{}", e),
        }

        if self.busy {
            println!("submission in flight");
        }
    }

    fn setup_audio_pipeline(config: &Config) -> RecorderHandle {
        let (chunk_tx, chunk_rx) = mpsc::channel(100);
        let format = AudioFormat {
            sample_rate: config.sample_rate,
            channels: 1,
        };

        // Create and spawn Recorder (using spawn_local because it's !Send)
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let recorder = Recorder::new(format, Box::new(MicDriver), cmd_rx, chunk_rx, chunk_tx);
        let recorder_handle = RecorderHandle::new(cmd_tx);
        tokio::task::spawn_local(recorder.run());

        recorder_handle
    }
}

fn print_help() {
    println!("commands:");
    println!("  mode url|audio   switch input mode");
    println!("  url <link>       set the URL to submit");
    println!("  record           start capturing from the microphone");
    println!("  stop             finish the capture");
    println!("  again            discard the finished capture");
    println!("  play             preview the finished capture");
    println!("  submit           send the active mode's input to the service");
    println!("  status           show mode, URL and capture state");
    println!("  help             show this list");
    println!("  quit             exit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn test_mode_command() {
        assert_eq!(parse_command("mode url"), Ok(Some(Command::Mode(Mode::Url))));
        assert_eq!(
            parse_command("mode audio"),
            Ok(Some(Command::Mode(Mode::Audio)))
        );
        assert!(parse_command("mode").is_err());
        assert!(parse_command("mode webcam").is_err());
    }

    #[test]
    fn test_url_command() {
        assert_eq!(
            parse_command("url https://youtu.be/abc123"),
            Ok(Some(Command::Url("https://youtu.be/abc123".to_string())))
        );
        assert_eq!(
            parse_command("  url   https://youtu.be/abc123  "),
            Ok(Some(Command::Url("https://youtu.be/abc123".to_string())))
        );
        // bare `url` clears the stored link
        assert_eq!(parse_command("url"), Ok(Some(Command::Url(String::new()))));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("record"), Ok(Some(Command::Record)));
        assert_eq!(parse_command("stop"), Ok(Some(Command::Stop)));
        assert_eq!(parse_command("again"), Ok(Some(Command::Again)));
        assert_eq!(parse_command("play"), Ok(Some(Command::Play)));
        assert_eq!(parse_command("submit"), Ok(Some(Command::Submit)));
        assert_eq!(parse_command("status"), Ok(Some(Command::Status)));
        assert_eq!(parse_command("help"), Ok(Some(Command::Help)));
        assert_eq!(parse_command("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_command("rewind").unwrap_err();
        assert!(err.contains("unknown command"));
        assert!(err.contains("rewind"));
    }
}
