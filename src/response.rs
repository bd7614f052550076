//! Narrowing blocks with externally judged candidate pairs.
//!
//! A judging stage (e.g. an LLM batch job) reads a block, emits one request
//! per `"<query_id>#<candidate_id>"` pair or one request per query id, and
//! later returns verdicts. These helpers intersect those verdicts with the
//! block they were produced from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use serde::Deserialize;
use tracing::warn;

use crate::blocks::Blocks;
use crate::error::ResponseError;
use crate::record::RecordId;

/// A `(query, candidate)` pair, written `"<query>#<candidate>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub query: RecordId,
    pub candidate: RecordId,
}

impl FromStr for PairKey {
    type Err = ResponseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (query, candidate) = s
            .split_once('#')
            .ok_or_else(|| ResponseError::PairKey(s.to_string()))?;
        let parse = |id: &str| {
            id.trim()
                .parse::<RecordId>()
                .map_err(|_| ResponseError::PairKey(s.to_string()))
        };
        Ok(Self {
            query: parse(query)?,
            candidate: parse(candidate)?,
        })
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.query, self.candidate)
    }
}

/// External verdict on one candidate pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Judgment {
    pub pair: PairKey,
    pub is_match: bool,
}

/// Keep `c` in `blocks[q]` only if some judgment marks `(q, c)` a match.
///
/// Every query id of `blocks` keeps an entry, possibly empty; judgments for
/// pairs outside the blocks are ignored.
pub fn refine<I>(blocks: &Blocks, judgments: I) -> Blocks
where
    I: IntoIterator<Item = Judgment>,
{
    let mut accepted: AHashMap<PairKey, bool> = AHashMap::new();
    for judgment in judgments {
        let verdict = accepted.entry(judgment.pair).or_insert(false);
        *verdict |= judgment.is_match;
    }

    blocks
        .iter()
        .map(|(query, block)| {
            let kept: Vec<RecordId> = block
                .iter()
                .copied()
                .filter(|&candidate| {
                    accepted
                        .get(&PairKey { query, candidate })
                        .copied()
                        .unwrap_or(false)
                })
                .collect();
            (query, kept)
        })
        .collect()
}

/// Apply per-query verdict vectors positionally to the block order.
///
/// Queries without verdicts get an empty block. Verdicts beyond the block
/// length are ignored.
pub fn conform_positional(blocks: &Blocks, verdicts: &BTreeMap<RecordId, Vec<bool>>) -> Blocks {
    blocks
        .iter()
        .map(|(query, block)| {
            let kept: Vec<RecordId> = match verdicts.get(&query) {
                Some(flags) => {
                    if flags.len() != block.len() {
                        warn!(
                            query,
                            verdicts = flags.len(),
                            block = block.len(),
                            "verdict count does not match block size"
                        );
                    }
                    block
                        .iter()
                        .zip(flags)
                        .filter(|(_, keep)| **keep)
                        .map(|(&candidate, _)| candidate)
                        .collect()
                }
                None => Vec::new(),
            };
            (query, kept)
        })
        .collect()
}

/// Keep the JSONL request lines whose pair is still inside `blocks`.
pub fn filter_requests<'l, I>(lines: I, blocks: &Blocks) -> Result<Vec<&'l str>, ResponseError>
where
    I: IntoIterator<Item = &'l str>,
{
    #[derive(Deserialize)]
    struct Request {
        custom_id: String,
    }

    let mut kept = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = serde_json::from_str(line)?;
        let pair: PairKey = request.custom_id.parse()?;
        if blocks.contains(pair.query, pair.candidate) {
            kept.push(line);
        }
    }
    Ok(kept)
}

/// Verdicts parsed from one batch output line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchVerdict {
    /// `custom_id` was a pair key.
    Pair(Judgment),
    /// `custom_id` was a bare query id; one verdict per content line.
    Positional { query: RecordId, verdicts: Vec<bool> },
}

#[derive(Deserialize)]
struct BatchLine {
    custom_id: String,
    response: BatchResponse,
}

#[derive(Deserialize)]
struct BatchResponse {
    body: BatchBody,
}

#[derive(Deserialize)]
struct BatchBody {
    choices: Vec<BatchChoice>,
}

#[derive(Deserialize)]
struct BatchChoice {
    message: BatchMessage,
}

#[derive(Deserialize)]
struct BatchMessage {
    content: Option<String>,
}

/// Read `custom_id` and `response.body.choices[0].message.content`.
///
/// A content line is a positive verdict iff it contains `"True"`.
pub fn parse_batch_response_line(line: &str) -> Result<BatchVerdict, ResponseError> {
    let parsed: BatchLine = serde_json::from_str(line)?;
    let content = parsed
        .response
        .body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(ResponseError::MissingContent)?;

    if parsed.custom_id.contains('#') {
        let pair: PairKey = parsed.custom_id.parse()?;
        return Ok(BatchVerdict::Pair(Judgment {
            pair,
            is_match: content.contains("True"),
        }));
    }

    let query = parsed
        .custom_id
        .trim()
        .parse::<RecordId>()
        .map_err(|_| ResponseError::RecordId(parsed.custom_id.clone()))?;
    Ok(BatchVerdict::Positional {
        query,
        verdicts: content.split('\n').map(|l| l.contains("True")).collect(),
    })
}

/// Collected verdicts of a whole batch output file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutput {
    pub judgments: Vec<Judgment>,
    pub positional: BTreeMap<RecordId, Vec<bool>>,
}

impl BatchOutput {
    pub fn parse<'l, I>(lines: I) -> Result<Self, ResponseError>
    where
        I: IntoIterator<Item = &'l str>,
    {
        let mut output = Self::default();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match parse_batch_response_line(line)? {
                BatchVerdict::Pair(judgment) => output.judgments.push(judgment),
                BatchVerdict::Positional { query, verdicts } => {
                    output.positional.insert(query, verdicts);
                }
            }
        }
        Ok(output)
    }

    /// Narrow `blocks`: positional verdicts win for their query ids, pair
    /// judgments decide the rest.
    pub fn apply(&self, blocks: &Blocks) -> Blocks {
        let by_pair = refine(blocks, self.judgments.iter().copied());
        let by_position = conform_positional(blocks, &self.positional);
        blocks
            .queries()
            .map(|query| {
                let source = if self.positional.contains_key(&query) {
                    &by_position
                } else {
                    &by_pair
                };
                (query, source.get(query).unwrap_or(&[]).to_vec())
            })
            .collect()
    }
}
