use dagcbor_conformance::adapter::{Adapter, Codec, CodecError, GenericValue, RejectionPolicy};
use dagcbor_conformance::engine::execute_case;
use dagcbor_conformance::types::*;

/// Treats bytes as their own value; rejects anything starting with a break
/// byte and refuses tagged generic values.
struct MockCodec;

impl Codec for MockCodec {
    type Value = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match bytes.first() {
            Some(0xff) => Err(CodecError::validation("unexpected break byte")),
            _ => Ok(bytes.to_vec()),
        }
    }

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(value.clone())
    }

    fn from_generic(&self, value: GenericValue) -> Result<Vec<u8>, CodecError> {
        if let GenericValue::Tag(tag, _) = value {
            return Err(CodecError::validation(format!("tag {tag} not allowed")));
        }
        let mut out = Vec::new();
        ciborium::ser::into_writer(&value, &mut out).map_err(|e| CodecError::other(e.to_string()))?;
        Ok(out)
    }
}

/// Encodes by reversing the bytes, so every encode disagrees with the fixture.
struct ReversingCodec;

impl Codec for ReversingCodec {
    type Value = Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(value.iter().rev().copied().collect())
    }

    fn from_generic(&self, _value: GenericValue) -> Result<Vec<u8>, CodecError> {
        Ok(vec![0x82, 0x01, 0x02])
    }
}

/// Panics on every decode, like a native binding hitting malformed input.
struct PanickingCodec;

impl Codec for PanickingCodec {
    type Value = ();

    fn decode(&self, _bytes: &[u8]) -> Result<(), CodecError> {
        panic!("native fault");
    }

    fn encode(&self, _value: &()) -> Result<Vec<u8>, CodecError> {
        Ok(vec![])
    }

    fn from_generic(&self, _value: GenericValue) -> Result<(), CodecError> {
        Ok(())
    }
}

struct UnsupportedCodec;

impl Codec for UnsupportedCodec {
    type Value = ();

    fn decode(&self, _bytes: &[u8]) -> Result<(), CodecError> {
        Err(CodecError::unsupported("not implemented"))
    }

    fn encode(&self, _value: &()) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::unsupported("not implemented"))
    }

    fn from_generic(&self, _value: GenericValue) -> Result<(), CodecError> {
        Ok(())
    }
}

fn adapter<C: Codec + 'static>(name: &str, codec: C) -> Adapter {
    Adapter::new(name, LibMetadata::default(), codec)
}

fn case(kind: CaseKind) -> TestCase {
    TestCase {
        id: String::new(),
        name: None,
        desc: None,
        tags: vec!["basic".into()],
        kind,
    }
}

fn hex(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap()
}

#[test]
fn identical_roundtrip_passes() {
    let c = case(CaseKind::Roundtrip { data: hex("a1616100") });
    let v = execute_case(&c, &adapter("mock", MockCodec));
    assert_eq!(v, Verdict::pass());
    assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"pass":true}"#);
}

#[test]
fn roundtrip_mismatch_reports_actual_output() {
    let c = case(CaseKind::Roundtrip { data: hex("0102") });
    let v = execute_case(&c, &adapter("rev", ReversingCodec));
    assert_eq!(v, Verdict::mismatch(&hex("0201")));
}

#[test]
fn roundtrip_error_is_a_failure_not_a_skip() {
    let c = case(CaseKind::Roundtrip { data: hex("ff00") });
    let v = execute_case(&c, &adapter("mock", MockCodec));
    assert_eq!(v, Verdict::error("unexpected break byte"));
    assert_eq!(v.outcome(), Some(false));
}

#[test]
fn decode_must_be_identity() {
    let ok = case(CaseKind::Decode { input: hex("820102") });
    assert_eq!(execute_case(&ok, &adapter("mock", MockCodec)), Verdict::pass());
    let v = execute_case(&ok, &adapter("rev", ReversingCodec));
    assert_eq!(v, Verdict::mismatch(&hex("020182")));
}

#[test]
fn rejected_invalid_input_passes_with_message() {
    let c = case(CaseKind::InvalidIn { data: hex("ff") });
    let v = execute_case(&c, &adapter("mock", MockCodec));
    assert_eq!(
        serde_json::to_string(&v).unwrap(),
        r#"{"pass":true,"error":"unexpected break byte"}"#
    );
}

#[test]
fn accepted_invalid_input_fails() {
    let c = case(CaseKind::InvalidIn { data: hex("00") });
    let v = execute_case(&c, &adapter("mock", MockCodec));
    assert_eq!(v, Verdict::accepted());
    assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"pass":false}"#);
}

#[test]
fn encode_uses_reference_decoder_then_adapter() {
    let c = case(CaseKind::Encode {
        input: hex("820102"),
        output: hex("820102"),
    });
    assert_eq!(execute_case(&c, &adapter("mock", MockCodec)), Verdict::pass());

    let v = execute_case(&c, &adapter("rev", ReversingCodec));
    assert_eq!(
        serde_json::to_string(&v).unwrap(),
        r#"{"pass":false,"output":"020182"}"#
    );
}

#[test]
fn invalid_out_passes_when_encode_refuses() {
    // tag 1 wrapping 0
    let c = case(CaseKind::InvalidOut { data: hex("c100") });
    let v = execute_case(&c, &adapter("mock", MockCodec));
    assert_eq!(v, Verdict::rejected("tag 1 not allowed"));

    let plain = case(CaseKind::InvalidOut { data: hex("01") });
    assert_eq!(execute_case(&plain, &adapter("mock", MockCodec)), Verdict::accepted());
}

#[test]
fn unparseable_reference_input_is_skipped() {
    let c = case(CaseKind::InvalidOut { data: hex("ff") });
    assert_eq!(execute_case(&c, &adapter("mock", MockCodec)), Verdict::Skipped);
}

#[test]
fn panic_is_a_failure_by_default() {
    let c = case(CaseKind::InvalidIn { data: hex("ff") });
    let v = execute_case(&c, &adapter("native", PanickingCodec));
    assert_eq!(v, Verdict::error("native fault"));
}

#[test]
fn panic_counts_as_rejection_when_policy_allows() {
    let c = case(CaseKind::InvalidIn { data: hex("ff") });
    let a = adapter("native", PanickingCodec).with_policy(RejectionPolicy {
        panics_count_as_rejection: true,
    });
    assert_eq!(execute_case(&c, &a), Verdict::rejected("native fault"));

    // A panic on a case that should succeed is still a failure.
    let rt = case(CaseKind::Roundtrip { data: hex("00") });
    assert_eq!(execute_case(&rt, &a).outcome(), Some(false));
}

#[test]
fn unsupported_constructs_are_skipped() {
    let a = adapter("partial", UnsupportedCodec);
    let rt = case(CaseKind::Roundtrip { data: hex("00") });
    let bad = case(CaseKind::InvalidIn { data: hex("ff") });
    assert_eq!(execute_case(&rt, &a), Verdict::Skipped);
    assert_eq!(execute_case(&bad, &a), Verdict::Skipped);
}

#[test]
fn skip_list_short_circuits_the_codec() {
    let mut c = case(CaseKind::InvalidIn { data: hex("ff") });
    c.id = "undefined_invalid_out".into();
    let a = adapter("native", PanickingCodec).with_skipped_ids(["undefined_invalid_out"]);
    let v = execute_case(&c, &a);
    assert_eq!(v, Verdict::Skipped);
    assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"pass":null}"#);
}
