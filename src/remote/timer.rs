use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RemoteError;

/// Commands understood by the remote timer service.
///
/// `Start`, `Stop` and `Reset` carry no value; the others take a time in
/// milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerCommand {
    /// Configure the timer's initial value.
    Setup(u64),
    /// Start counting from the currently accumulated value.
    Start,
    /// Stop counting, keeping the value unchanged.
    Stop,
    /// Return to the configured initial value.
    Reset,
    /// Increase the time by a given amount.
    Add(u64),
    /// Decrease the time by a given amount.
    Sub(u64),
}

impl TimerCommand {
    fn action(&self) -> &'static str {
        match self {
            TimerCommand::Setup(_) => "setup",
            TimerCommand::Start => "start",
            TimerCommand::Stop => "stop",
            TimerCommand::Reset => "reset",
            TimerCommand::Add(_) => "add",
            TimerCommand::Sub(_) => "sub",
        }
    }

    fn value(&self) -> Option<u64> {
        match *self {
            TimerCommand::Setup(v) | TimerCommand::Add(v) | TimerCommand::Sub(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct CommandRequest {
    #[serde(rename = "Action")]
    action: &'static str,
    #[serde(rename = "Value", skip_serializing_if = "Option::is_none")]
    value: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TimeResponse {
    #[serde(rename = "Time")]
    time: u64,
}

/// JSON client for a remote timer endpoint.
///
/// When configured, the controller mirrors its run control here so an
/// external timer display follows along.
#[derive(Clone, Debug)]
pub struct RemoteTimerClient {
    http: reqwest::Client,
    url: String,
}

impl RemoteTimerClient {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    /// Send one command. Successful commands produce no response body.
    pub async fn send(&self, command: TimerCommand) -> Result<(), RemoteError> {
        debug!("Remote timer command {:?} to {}", command, self.url);
        let request = CommandRequest {
            action: command.action(),
            value: command.value(),
        };
        self.http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Stop the remote timer and zero it, as one operation.
    pub async fn reset_run(&self) -> Result<(), RemoteError> {
        self.send(TimerCommand::Stop).await?;
        self.send(TimerCommand::Setup(0)).await?;
        self.send(TimerCommand::Reset).await
    }

    /// Fetch the currently accumulated time in milliseconds.
    pub async fn current_time(&self) -> Result<u64, RemoteError> {
        let response: TimeResponse = self
            .http
            .get(&self.url)
            .header("Content-Type", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valueless_commands_omit_the_value_field() {
        let request = CommandRequest {
            action: TimerCommand::Start.action(),
            value: TimerCommand::Start.value(),
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"Action":"start"}"#
        );
    }

    #[test]
    fn valued_commands_carry_milliseconds() {
        for (command, expected) in [
            (TimerCommand::Setup(1500), r#"{"Action":"setup","Value":1500}"#),
            (TimerCommand::Add(250), r#"{"Action":"add","Value":250}"#),
            (TimerCommand::Sub(250), r#"{"Action":"sub","Value":250}"#),
        ] {
            let request = CommandRequest {
                action: command.action(),
                value: command.value(),
            };
            assert_eq!(serde_json::to_string(&request).unwrap(), expected);
        }
    }

    #[test]
    fn time_response_field_is_capitalized() {
        let response: TimeResponse = serde_json::from_str(r#"{"Time": 61500}"#).unwrap();
        assert_eq!(response.time, 61_500);
    }
}
