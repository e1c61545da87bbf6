use std::sync::Arc;

use bytes::Bytes;
use dify2openai::config::{CompatConfig, UsageDefaults};
use dify2openai::protocol::dify::event::{EventClassifier, Outcome};
use dify2openai::state::SequentialIds;
use dify2openai::stream::{AggregateResult, EventDecoder, ResponseAggregator, StreamSynthesizer};
use serde_json::Value;

const TRANSCRIPT: &str = concat!(
    "event: ping\n\n",
    "data: {\"event\": \"message\", \"answer\": \" Caf\u{e9}\", \"created_at\": 10}\n\n",
    "data: {\"event\": \"message\", \"answer\": \n\n",
    "data: {\"event\": \"agent_message\", \"answer\": \" \u{2615} ok\"}\r\n\r\n",
    "data: {\"event\": \"node_finished\", \"data\": {}}\n\n",
    "data: {\"event\": \"message_end\", \"metadata\": {\"usage\": {\"prompt_tokens\": 3, \"completion_tokens\": 4, \"total_tokens\": 7}}}\n\n",
    "data: {\"event\": \"workflow_finished\", \"data\": {\"outputs\": {\"text\": \"late\"}}}\n\n",
);

fn decode_in_chunks(chunks: &[&[u8]]) -> Vec<Outcome> {
    let mut decoder = EventDecoder::new(EventClassifier::new(None));
    let mut outcomes = Vec::new();
    for chunk in chunks {
        decoder.feed_into(chunk, &mut outcomes);
    }
    decoder.finish_into(&mut outcomes);
    outcomes
}

fn synthesize(outcomes: Vec<Outcome>) -> Vec<Bytes> {
    let mut synthesizer = StreamSynthesizer::new(
        "dify".to_string(),
        Arc::new(SequentialIds::new(1_700_000_000)),
        UsageDefaults::default(),
        false,
    );
    let mut frames = Vec::new();
    for outcome in outcomes {
        synthesizer.push_outcome(outcome, &mut frames);
    }
    synthesizer.finish(&mut frames);
    frames
}

fn frame_contents(frames: &[Bytes]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|frame| {
            let text = std::str::from_utf8(frame).expect("utf8 frame");
            let payload = text.strip_prefix("data: ")?.trim_end();
            let chunk: Value = serde_json::from_str(payload).ok()?;
            chunk["choices"][0]["delta"]["content"]
                .as_str()
                .map(ToString::to_string)
        })
        .collect()
}

#[test]
fn test_outcomes_do_not_depend_on_chunk_boundaries() {
    let bytes = TRANSCRIPT.as_bytes();
    let whole = decode_in_chunks(&[bytes]);
    assert_eq!(whole.len(), 4);

    for split in 1..bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(decode_in_chunks(&[head, tail]), whole, "split at byte {split}");
    }

    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_in_chunks(&singles), whole);
}

#[test]
fn test_streamed_text_equals_upstream_text_minus_leading_whitespace() {
    let frames = synthesize(decode_in_chunks(&[TRANSCRIPT.as_bytes()]));
    let streamed: String = frame_contents(&frames).concat();
    assert_eq!(streamed, "Caf\u{e9} \u{2615} ok");

    let done_frames = frames
        .iter()
        .filter(|frame| &frame[..] == b"data: [DONE]\n\n")
        .count();
    assert_eq!(done_frames, 1);
    assert_eq!(
        frames.last().map(|frame| &frame[..]),
        Some(&b"data: [DONE]\n\n"[..])
    );
}

#[test]
fn test_buffered_text_is_fully_trimmed_and_first_terminal_wins() {
    let mut aggregator = ResponseAggregator::new(CompatConfig::default());
    for outcome in decode_in_chunks(&[TRANSCRIPT.as_bytes()]) {
        aggregator.push_outcome(outcome);
    }
    let AggregateResult::Completed { content, usage } = aggregator.finish() else {
        panic!("expected a completed aggregate");
    };
    assert_eq!(content, "Caf\u{e9} \u{2615} ok");
    assert_eq!(usage.total_tokens, 7);
}

#[test]
fn test_error_before_end_fails_in_both_modes() {
    let transcript = concat!(
        "data: {\"event\": \"message\", \"answer\": \"half\"}\n\n",
        "data: {\"event\": \"error\", \"status\": 429, \"code\": 42, \"message\": \"rate limited\"}\n\n",
        "data: {\"event\": \"message_end\"}\n\n",
    );

    let outcomes = decode_in_chunks(&[transcript.as_bytes()]);
    let mut aggregator = ResponseAggregator::new(CompatConfig::default());
    for outcome in outcomes.clone() {
        aggregator.push_outcome(outcome);
    }
    assert_eq!(aggregator.finish(), AggregateResult::Failed);

    let frames = synthesize(outcomes);
    assert_eq!(frames.len(), 3);
    assert_eq!(frame_contents(&frames), vec!["half"]);
    assert_eq!(
        &frames[1][..],
        b"data: {\"error\":\"rate limited\"}\n\n".as_slice()
    );
}

#[test]
fn test_unterminated_final_line_is_flushed() {
    let transcript = concat!(
        "data: {\"event\": \"message\", \"answer\": \"tail\"}\n\n",
        "data: {\"event\": \"message_end\"}",
    );
    let outcomes = decode_in_chunks(&[transcript.as_bytes()]);
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[1], Outcome::EndOfStream(_)));
}
