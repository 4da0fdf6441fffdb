//! Terminal stand-ins for the microphone and speaker.
//!
//! Typed lines play the role of transcribed speech; spoken output is printed.
//! Lets the whole controller run without audio hardware.

use super::{Cue, INSTRUCTIONS_TEXT, Microphone, Speaker, SpeechSegment};
use crate::config::ListenWindow;
use crate::error::{CoachError, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Reads one typed line per listen.
///
/// The first byte typed starts the phrase and must arrive within the
/// window's initial timeout. The rest of the line must follow within the
/// phrase limit; whatever was typed by then is taken as the phrase.
pub struct ConsoleMicrophone<R = BufReader<Stdin>> {
    reader: Mutex<R>,
}

impl ConsoleMicrophone {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }
}

impl Default for ConsoleMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ConsoleMicrophone<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: Mutex::new(reader),
        }
    }
}

#[async_trait]
impl<R> Microphone for ConsoleMicrophone<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn listen(&self, window: ListenWindow) -> Result<SpeechSegment> {
        let mut reader = self.reader.lock().await;
        print_line("(listening)");

        match tokio::time::timeout(window.initial_timeout(), reader.fill_buf()).await {
            Err(_) => {
                return Err(CoachError::ListenTimeout {
                    waited_secs: window.initial_timeout_secs,
                });
            }
            Ok(Err(e)) => return Err(CoachError::Audio(format!("console read failed: {e}"))),
            Ok(Ok(buf)) if buf.is_empty() => {
                return Err(CoachError::AudioDevice("console input closed".into()));
            }
            Ok(Ok(_)) => {}
        }

        let mut line = Vec::new();
        match tokio::time::timeout(window.max_phrase(), reader.read_until(b'\n', &mut line)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(CoachError::Audio(format!("console read failed: {e}"))),
            Err(_) => debug!(
                limit_secs = window.max_phrase_secs,
                "phrase limit reached, keeping partial input"
            ),
        }
        let text = String::from_utf8_lossy(&line)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        Ok(SpeechSegment::text(text))
    }
}

/// Prints spoken text and cue names to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        print_line(&format!("coach: {text}"));
        Ok(())
    }

    async fn play_cue(&self, cue: Cue) -> Result<()> {
        match cue {
            Cue::ListeningBeep => print_line("*beep*"),
            Cue::NotUnderstood => print_line("*bonk*"),
            Cue::Instructions => print_line(&format!("coach: {INSTRUCTIONS_TEXT}")),
        }
        Ok(())
    }
}

fn print_line(text: &str) {
    if let Err(e) = write_line(&mut std::io::stdout().lock(), text) {
        warn!("console write failed: {e}");
    }
}

fn write_line(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    writeln!(out, "{text}")?;
    out.flush()
}
