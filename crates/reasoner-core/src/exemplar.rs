//! Few-shot Exemplars
//!
//! Prior reasoning chains similar to the current task, prepended to the
//! conversation before the system framing. Retrieval and similarity search
//! live behind [`ChainStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::prompt::exemplar_header;

/// One prior chain: the task it solved and its trimmed conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemplarChain {
    pub task: String,
    pub messages: Vec<Message>,
}

/// Read-only lookup of similar chains
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Chains similar to `task`, most similar first
    async fn similar_chains(&self, task: &str, api_key: &str) -> Result<Vec<ExemplarChain>>;
}

/// Flatten chains into exemplar turns
pub fn render_exemplars(chains: &[ExemplarChain]) -> Vec<Message> {
    chains
        .iter()
        .flat_map(|chain| {
            std::iter::once(Message::system(exemplar_header(&chain.task)))
                .chain(chain.messages.iter().cloned())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exemplars() {
        let chains = vec![
            ExemplarChain {
                task: "1+1".into(),
                messages: vec![
                    Message::user("step"),
                    Message::assistant(Some("2 <DONE>".into()), vec![]),
                ],
            },
            ExemplarChain {
                task: "3*3".into(),
                messages: vec![Message::assistant(Some("9".into()), vec![])],
            },
        ];

        let turns = render_exemplars(&chains);
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0], Message::system("<EXAMPLE_TASK>\n1+1"));
        assert_eq!(turns[3], Message::system("<EXAMPLE_TASK>\n3*3"));
    }
}
