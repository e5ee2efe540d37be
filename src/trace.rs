//! Call trace utilities
//!
//! Understands the output of the `callTracer` debug tracer and flattens the
//! call tree into the ordered list of internal calls a decoder consumes.
//!
//! Order is depth-first, parent before children, siblings in trace order.
//! The root node is the transaction itself and is not an internal call.
//! A call's position in the returned list is its ordinal within the
//! transaction, which together with the transaction hash identifies an
//! emitted movement.
//!
//! A revert rolls back everything beneath it. Calls under a reverted root or
//! a reverted sub-call carry the ancestor's error even when their own node
//! reports none.

use crate::types::{CallTrace, InternalCall};

/// Flatten a call tree into internal calls, excluding the root.
pub fn flatten_call_trace(trace: &CallTrace) -> Vec<InternalCall> {
    fn walk(node: &CallTrace, reverted: Option<&str>, out: &mut Vec<InternalCall>) {
        let reverted = node.error.as_deref().or(reverted);
        if let Some(children) = &node.calls {
            for child in children {
                let mut call = to_internal_call(child);
                if call.error.is_none() {
                    call.error = reverted.map(|reason| format!("parent reverted: {}", reason));
                }
                out.push(call);
                walk(child, reverted, out);
            }
        }
    }

    let mut result = Vec::new();
    walk(trace, None, &mut result);
    result
}

fn to_internal_call(node: &CallTrace) -> InternalCall {
    InternalCall {
        call_type: node
            .r#type
            .as_deref()
            .unwrap_or("")
            .to_ascii_uppercase(),
        from: node.from,
        to: node.to,
        value: node.value,
        input: node.input.clone(),
        error: node.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Address, U256};

    fn addr1() -> Address {
        address!("0000000000000000000000000000000000000001")
    }
    fn addr2() -> Address {
        address!("0000000000000000000000000000000000000002")
    }
    fn addr3() -> Address {
        address!("0000000000000000000000000000000000000003")
    }

    /// Helper to build a simple call trace node.
    fn node(
        node_type: &str,
        from: Address,
        to: Address,
        value: u64,
        calls: Option<Vec<CallTrace>>,
    ) -> CallTrace {
        CallTrace {
            r#type: Some(node_type.to_string()),
            from: Some(from),
            to: Some(to),
            value: U256::from(value),
            input: Vec::new(),
            calls,
            error: None,
        }
    }

    #[test]
    fn test_root_only_has_no_internal_calls() {
        let root = node("CALL", addr1(), addr2(), 5, None);
        assert!(flatten_call_trace(&root).is_empty());
    }

    #[test]
    fn test_depth_first_order() {
        // root
        //  ├─ a (CALL 1)
        //  │   └─ a1 (delegatecall 2)
        //  └─ b (SELFDESTRUCT 3)
        let a1 = node("delegatecall", addr2(), addr3(), 2, None);
        let a = node("CALL", addr1(), addr2(), 1, Some(vec![a1]));
        let b = node("SELFDESTRUCT", addr2(), addr3(), 3, None);
        let root = node("CALL", addr1(), addr2(), 0, Some(vec![a, b]));

        let calls = flatten_call_trace(&root);
        let values: Vec<U256> = calls.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![U256::from(1u64), U256::from(2u64), U256::from(3u64)]);
        assert_eq!(calls[1].call_type, "DELEGATECALL");
    }

    #[test]
    fn test_missing_type_becomes_empty_tag() {
        let mut child = node("CALL", addr2(), addr3(), 1, None);
        child.r#type = None;
        child.error = Some("execution reverted".into());
        let root = node("CALL", addr1(), addr2(), 0, Some(vec![child]));

        let calls = flatten_call_trace(&root);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_type, "");
        assert_eq!(calls[0].error.as_deref(), Some("execution reverted"));
    }

    #[test]
    fn test_reverted_root_marks_every_call() {
        let leaf = node("CALL", addr2(), addr3(), 7, None);
        let child = node("CALL", addr1(), addr2(), 1, Some(vec![leaf]));
        let mut root = node("CALL", addr1(), addr2(), 0, Some(vec![child]));
        root.error = Some("execution reverted".into());

        let calls = flatten_call_trace(&root);
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.error.is_some()));
    }

    #[test]
    fn test_reverted_subcall_marks_only_its_subtree() {
        // root
        //  ├─ a (reverted)
        //  │   └─ a1
        //  └─ b
        let a1 = node("CALL", addr2(), addr3(), 100, None);
        let mut a = node("CALL", addr1(), addr2(), 0, Some(vec![a1]));
        a.error = Some("out of gas".into());
        let b = node("CALL", addr1(), addr3(), 5, None);
        let root = node("CALL", addr1(), addr2(), 0, Some(vec![a, b]));

        let calls = flatten_call_trace(&root);
        assert_eq!(calls[0].error.as_deref(), Some("out of gas"));
        assert_eq!(calls[1].error.as_deref(), Some("parent reverted: out of gas"));
        assert_eq!(calls[2].error, None);
    }
}
