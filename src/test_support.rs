//! Collaborator fakes shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::notifications::{Notifier, Severity};
use crate::transport::{Transport, TransportError};

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| *s == severity)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}

type Scripted = Result<Value, TransportError>;

/// Replays queued responses per path. The last queued response for a path is
/// repeated once the queue is down to one entry. Unscripted paths fail.
#[derive(Default)]
pub struct ScriptedTransport {
    get_delay: Option<Duration>,
    gets: Mutex<HashMap<String, VecDeque<Scripted>>>,
    post_responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    get_log: Mutex<Vec<String>>,
    post_log: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    /// Every GET picks its response when sent and answers after `delay`.
    pub fn with_get_delay(delay: Duration) -> Self {
        Self {
            get_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn push_get(&self, path: &str, response: Scripted) {
        self.gets
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_post(&self, path: &str, response: Scripted) {
        self.post_responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn gets(&self) -> Vec<String> {
        self.get_log.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.post_log.lock().unwrap().clone()
    }

    fn next(queues: &Mutex<HashMap<String, VecDeque<Scripted>>>, path: &str) -> Scripted {
        let mut queues = queues.lock().unwrap();
        match queues.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Err(TransportError::Status {
                path: path.to_string(),
                status: 404,
                message: format!("no scripted response for {path}"),
            }),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, path: &str) -> Result<Value, TransportError> {
        self.get_log.lock().unwrap().push(path.to_string());
        let response = Self::next(&self.gets, path);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        response
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        self.post_log.lock().unwrap().push((path.to_string(), body));
        Self::next(&self.post_responses, path)
    }
}

/// Yields to the scheduler until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after 1000 yields");
}
