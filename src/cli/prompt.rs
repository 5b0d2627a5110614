use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("input closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Interactive input used by `config add` and `config update`.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Asks for a line of text. Empty input yields `default` when given.
    async fn ask(&self, label: &str, default: Option<&str>) -> Result<String, PromptError>;

    /// Asks a yes/no question.
    async fn confirm(&self, question: &str, default: bool) -> Result<bool, PromptError>;

    /// Prints an informational line next to the prompts.
    async fn notice(&self, text: &str);
}

/// Reads answers from stdin and writes prompts to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

impl StdinPrompter {
    async fn read_line(prompt: String) -> Result<String, PromptError> {
        let task = tokio::task::spawn_blocking(move || -> Result<String, PromptError> {
            let mut stderr = io::stderr().lock();
            write!(stderr, "{}", prompt)?;
            stderr.flush()?;

            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line)? == 0 {
                return Err(PromptError::Closed);
            }
            Ok(line.trim().to_string())
        });
        task.await
            .map_err(|e| PromptError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, label: &str, default: Option<&str>) -> Result<String, PromptError> {
        let prompt = match default {
            Some(d) if !d.is_empty() => format!("[+] {} [{}]: ", label, d),
            _ => format!("[+] {}: ", label),
        };
        let answer = Self::read_line(prompt).await?;
        match default {
            Some(d) if answer.is_empty() => Ok(d.to_string()),
            _ => Ok(answer),
        }
    }

    async fn confirm(&self, question: &str, default: bool) -> Result<bool, PromptError> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = Self::read_line(format!("[?] {} {} ", question, hint)).await?;
            match parse_yes_no(&answer, default) {
                Some(choice) => return Ok(choice),
                None => continue,
            }
        }
    }

    async fn notice(&self, text: &str) {
        eprintln!("{}", text);
    }
}

fn parse_yes_no(answer: &str, default: bool) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Replays canned answers and records what was asked.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: std::sync::Mutex<std::collections::VecDeque<String>>,
    pub transcript: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            transcript: Default::default(),
        }
    }

    fn next(&self, prompt: String) -> Result<String, PromptError> {
        self.transcript.lock().unwrap().push(prompt);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Closed)
    }

    pub fn asked(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn ask(&self, label: &str, default: Option<&str>) -> Result<String, PromptError> {
        let answer = self.next(label.to_string())?;
        match default {
            Some(d) if answer.is_empty() => Ok(d.to_string()),
            _ => Ok(answer),
        }
    }

    async fn confirm(&self, question: &str, default: bool) -> Result<bool, PromptError> {
        let answer = self.next(question.to_string())?;
        Ok(parse_yes_no(&answer, default).unwrap_or(default))
    }

    async fn notice(&self, text: &str) {
        self.transcript.lock().unwrap().push(format!("notice: {}", text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_parsing() {
        assert_eq!(parse_yes_no("", false), Some(false));
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no("Y", false), Some(true));
        assert_eq!(parse_yes_no("no", true), Some(false));
        assert_eq!(parse_yes_no("maybe", true), None);
    }

    #[tokio::test]
    async fn scripted_prompter_runs_dry() {
        let prompter = ScriptedPrompter::new(&["alice", ""]);
        assert_eq!(prompter.ask("Name", None).await.unwrap(), "alice");
        assert_eq!(
            prompter.ask("Zone", Some("ch-dk-2")).await.unwrap(),
            "ch-dk-2"
        );
        assert!(matches!(
            prompter.confirm("Again?", false).await,
            Err(PromptError::Closed)
        ));
        assert_eq!(prompter.asked(), vec!["Name", "Zone", "Again?"]);
    }
}
