use crate::export::NodeRecord;
use crate::node::{LibraryTree, NodeId};
use crate::parser::{Parser, Refreshed};
use thiserror::Error;

/// Expectations supplied by a parser implementation to run the shared contract suite.
#[derive(Debug, Clone)]
pub struct ParserContractExpectations {
    /// The media type the parser must report on every call.
    pub media_type: String,
    /// Names of the root's children, in source order.
    pub top_level: Vec<String>,
    /// A node id known to exist in the fixture.
    pub known_node: Option<NodeId>,
}

/// Errors surfaced by the parser contract test harness.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParserContractError {
    #[error("media type mismatch: expected {expected}, got {actual}")]
    MediaTypeMismatch { expected: String, actual: String },
    #[error("media type changed between calls")]
    UnstableMediaType,
    #[error("build_library failed: {0}")]
    BuildFailed(String),
    #[error("top-level nodes mismatch: expected {expected:?}, got {actual:?}")]
    TopLevelMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("expected node {id} is missing from the tree")]
    MissingNode { id: NodeId },
    #[error("refresh_library failed: {0}")]
    RefreshFailed(String),
    #[error("refresh of an unchanged source lost node {id}")]
    IdentityLost { id: NodeId },
    #[error("refresh of an unchanged source reported changes: {changes}")]
    SpuriousChanges { changes: String },
    #[error("replacement tree differs although the source did not change")]
    ReplacementDiffers,
    #[error("export round trip failed: {0}")]
    RoundTrip(String),
}

/// Run the shared parser contract suite against a parser implementation.
///
/// Parsers call this from their crate-level tests against a fixture that does
/// not change while the suite runs. Returns the built tree for further checks.
pub fn run_parser_contract<P: Parser + ?Sized>(
    parser: &P,
    expectations: &ParserContractExpectations,
) -> Result<LibraryTree, ParserContractError> {
    verify_media_type(parser, expectations)?;
    let built = parser
        .build_library()
        .map_err(|e| ParserContractError::BuildFailed(e.to_string()))?;
    verify_shape(&built, expectations)?;
    verify_refresh(parser, &built)?;
    verify_round_trip(&built)?;
    Ok(built)
}

fn verify_media_type<P: Parser + ?Sized>(
    parser: &P,
    expectations: &ParserContractExpectations,
) -> Result<(), ParserContractError> {
    let first = parser.media_type().to_string();
    if first != expectations.media_type {
        return Err(ParserContractError::MediaTypeMismatch {
            expected: expectations.media_type.clone(),
            actual: first,
        });
    }
    if parser.media_type() != first {
        return Err(ParserContractError::UnstableMediaType);
    }
    Ok(())
}

fn verify_shape(
    tree: &LibraryTree,
    expectations: &ParserContractExpectations,
) -> Result<(), ParserContractError> {
    let actual: Vec<String> = tree
        .children(tree.root_id())
        .map(|n| n.name().to_string())
        .collect();
    if actual != expectations.top_level {
        return Err(ParserContractError::TopLevelMismatch {
            expected: expectations.top_level.clone(),
            actual,
        });
    }
    if let Some(id) = &expectations.known_node {
        if !tree.contains(id) {
            return Err(ParserContractError::MissingNode { id: id.clone() });
        }
    }
    Ok(())
}

fn verify_refresh<P: Parser + ?Sized>(
    parser: &P,
    built: &LibraryTree,
) -> Result<(), ParserContractError> {
    let refreshed = parser
        .refresh_library(built.clone())
        .map_err(|e| ParserContractError::RefreshFailed(e.to_string()))?;

    match refreshed {
        Refreshed::Patched { tree, changes } => {
            let mut ids: Vec<&NodeId> = built.ids().collect();
            ids.sort();
            if let Some(lost) = ids.into_iter().find(|id| !tree.contains(id)) {
                return Err(ParserContractError::IdentityLost { id: lost.clone() });
            }
            if !changes.is_empty() {
                return Err(ParserContractError::SpuriousChanges {
                    changes: changes.to_string(),
                });
            }
        }
        Refreshed::Replaced(tree) => {
            if &tree != built {
                return Err(ParserContractError::ReplacementDiffers);
            }
        }
    }
    Ok(())
}

fn verify_round_trip(built: &LibraryTree) -> Result<(), ParserContractError> {
    let record = NodeRecord::from_tree(built, built.root_id())
        .ok_or_else(|| ParserContractError::RoundTrip("root missing".into()))?;
    let rebuilt = record
        .into_tree()
        .map_err(|e| ParserContractError::RoundTrip(e.to_string()))?;
    if &rebuilt != built {
        return Err(ParserContractError::RoundTrip(
            "rebuilt tree differs from the original".into(),
        ));
    }
    Ok(())
}
