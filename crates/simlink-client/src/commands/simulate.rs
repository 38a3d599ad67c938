//! Simulate command: plays a scripted simulation run against a relay.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;

use simlink_protocol::WireFormat;

use crate::error::{ClientError, ClientResult};
use crate::socket::SimulationClient;

/// The events a scripted run reports, in send order: completions, then
/// incomplete objectives, then scores, then the stop message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub completed: Vec<String>,
    pub incomplete: Vec<String>,
    pub scores: Vec<(String, String)>,
    pub stop: String,
}

impl Script {
    /// Builds a script from raw `OBJECTIVE=SCORE` arguments.
    pub fn from_args(
        completed: Vec<String>,
        incomplete: Vec<String>,
        scores: &[String],
        stop: String,
    ) -> ClientResult<Self> {
        let scores = scores
            .iter()
            .map(|arg| parse_score(arg))
            .collect::<ClientResult<Vec<_>>>()?;
        Ok(Self {
            completed,
            incomplete,
            scores,
            stop,
        })
    }
}

/// Splits `OBJECTIVE=SCORE`.
pub fn parse_score(arg: &str) -> ClientResult<(String, String)> {
    match arg.split_once('=') {
        Some((objective, score)) if !objective.is_empty() && !score.is_empty() => {
            Ok((objective.to_string(), score.to_string()))
        }
        _ => Err(ClientError::Usage(format!(
            "expected OBJECTIVE=SCORE, got {arg:?}"
        ))),
    }
}

/// Connects as `client_id`, sends the script and closes.
pub async fn run(
    addr: SocketAddr,
    client_id: &str,
    wire: WireFormat,
    timeout: Duration,
    script: &Script,
) -> ClientResult<()> {
    let mut client = SimulationClient::connect(addr, client_id, wire, timeout).await?;
    println!(
        "connected to relay session {} at {}",
        client.server_id(),
        client.relay_addr()
    );

    for objective in &script.completed {
        client.report_completion(objective, true).await?;
    }
    for objective in &script.incomplete {
        client.report_completion(objective, false).await?;
    }
    for (objective, score) in &script.scores {
        client.report_score(objective, score).await?;
    }

    let sent = script.completed.len() + script.incomplete.len() + script.scores.len();
    client.stop(&script.stop).await?;
    info!(events = sent, stop = %script.stop, "scripted run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use simlink_server::{ChannelSink, RelayConfig, spawn_relay};

    #[test]
    fn score_arguments() {
        assert_eq!(
            parse_score("obj-1=85").unwrap(),
            ("obj-1".to_string(), "85".to_string())
        );
        assert_eq!(
            parse_score("obj=1=2").unwrap(),
            ("obj".to_string(), "1=2".to_string())
        );
        assert!(matches!(parse_score("obj-1"), Err(ClientError::Usage(_))));
        assert!(parse_score("=85").is_err());
        assert!(parse_score("obj-1=").is_err());
    }

    #[test]
    fn script_from_args() {
        let script = Script::from_args(
            vec!["a".into()],
            vec![],
            &["b=10".to_string()],
            "STOPPED_NORMAL".into(),
        )
        .unwrap();
        assert_eq!(script.scores, vec![("b".to_string(), "10".to_string())]);

        let err = Script::from_args(vec![], vec![], &["bad".to_string()], "X".into());
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn scripted_run_reaches_sink() {
        let (sink, mut rx) = ChannelSink::new();
        let relay = spawn_relay(RelayConfig::new(0), sink).await.unwrap();

        let script = Script {
            completed: vec!["nav".into()],
            incomplete: vec!["radio".into()],
            scores: vec![("nav".into(), "77".into())],
            stop: "STOPPED_ABNORMAL".into(),
        };
        run(
            relay.local_addr(),
            "trainer",
            WireFormat::default(),
            Duration::from_secs(5),
            &script,
        )
        .await
        .unwrap();

        let mut seen = Vec::new();
        for _ in 0..5 {
            let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(text);
        }
        assert_eq!(
            seen,
            vec![
                "trainer:SIMULATION:RUNNING",
                "trainer:OBJECTIVE_COMPLETION:COMPLETE:nav",
                "trainer:OBJECTIVE_COMPLETION:INCOMPLETE:radio",
                "trainer:OBJECTIVE_SCORE:77:nav",
                "trainer:SIMULATION:STOPPED_ABNORMAL",
            ]
        );

        relay.shutdown();
        assert!(relay.join().await.is_normal());
    }
}
