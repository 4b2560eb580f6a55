//! Import parser: free-text process description to an ordered step list.

use crate::error::{Error, Result};
use crate::oracle::payload::assign_unique_ids;
use crate::oracle::schema::steps_schema;
use crate::oracle::{require_credential, OracleClient, OraclePayload, OracleRequest, PayloadKind};
use crate::types::ProcessStep;

const SYSTEM_PROMPT: &str = "You are a process analyst. You turn informal descriptions of work \
into precise, strictly sequential process definitions.";

/// Extract a sequential step list from a free-text description.
///
/// Step ids in the result are pairwise unique whatever the oracle returns.
pub fn parse_description(oracle: &dyn OracleClient, free_text: &str) -> Result<Vec<ProcessStep>> {
    require_credential(oracle)?;

    let free_text = free_text.trim();
    if free_text.is_empty() {
        return Err(Error::InvalidInput(
            "process description is empty".to_string(),
        ));
    }

    let mut request = OracleRequest::structured(build_prompt(free_text), steps_schema());
    request.system_instruction = Some(SYSTEM_PROMPT.to_string());

    tracing::info!(chars = free_text.len(), "Requesting step import");

    let reply = oracle.generate(&request)?;
    let raw = reply.trimmed_text().ok_or_else(|| {
        Error::MalformedResponse("import response contained no data".to_string())
    })?;

    let mut steps = OraclePayload::parse_text(PayloadKind::Steps, raw)?.into_steps()?;
    assign_unique_ids(&mut steps);

    tracing::info!(steps = steps.len(), "Import accepted");
    Ok(steps)
}

fn build_prompt(free_text: &str) -> String {
    format!(
        "Extract a strictly sequential list of process steps from the description below.\n\
         Each step needs an id, a short name and a description. Add the inputs the step \
         consumes and any conditions it depends on when the description mentions them.\n\n\
         Description:\n\"\"\"\n{free_text}\n\"\"\"\n\nReturn only JSON."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleReply;
    use crate::types::NO_INPUTS;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOracle {
        credential: bool,
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl OracleClient for FixedOracle {
        fn has_credential(&self) -> bool {
            self.credential
        }

        fn generate(&self, request: &OracleRequest) -> Result<OracleReply> {
            assert!(request.response_schema.is_some());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OracleReply::text(self.reply))
        }
    }

    fn oracle(reply: &'static str) -> FixedOracle {
        FixedOracle {
            credential: true,
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_duplicate_and_missing_ids_become_unique() {
        let oracle = oracle(
            r#"[
                {"id": "1", "name": "Receive", "description": "Receive coils"},
                {"id": "1", "name": "Cut", "description": "Cut sheet", "inputs": "Coil"},
                {"name": "Stamp", "description": "Stamp parts", "conditions": "Die installed"},
                {"id": "", "name": "Pack", "description": "Pack parts"}
            ]"#,
        );
        let steps = parse_description(&oracle, "receive, cut, stamp, pack").unwrap();

        assert_eq!(steps.len(), 4);
        let ids: HashSet<_> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(steps[0].inputs, NO_INPUTS);
        assert_eq!(steps[1].inputs, "Coil");
        assert_eq!(steps[2].conditions.as_deref(), Some("Die installed"));
        assert_eq!(
            steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["Receive", "Cut", "Stamp", "Pack"]
        );
    }

    #[test]
    fn test_no_credential() {
        let oracle = FixedOracle {
            credential: false,
            ..oracle("[]")
        };
        assert!(matches!(
            parse_description(&oracle, "anything"),
            Err(Error::OracleUnavailable)
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_conforming_output() {
        let oracle = oracle(r#"{"foo": 1}"#);
        assert!(matches!(
            parse_description(&oracle, "anything"),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_blank_description_rejected() {
        let oracle = oracle("[]");
        assert!(matches!(
            parse_description(&oracle, "   "),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }
}
