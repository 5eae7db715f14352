//! RDF/M3 graph codec for SSAP payloads.
//!
//! Converts between the XML and text dialects carried inside SSAP parameters
//! and [`ssap_core`] values. Pure synchronous; no transport dependencies.
//!
//! - [`namespace`]: prefix tables built from `xmlns` declarations.
//! - [`triples`]: RDF-M3 triple lists, with blank-node tracking.
//! - [`wql`]: WQL query descriptors and node lists.
//! - [`sparql`]: SPARQL SELECT text and SPARQL XML results.
//! - [`results`]: result decoding by query style.

pub mod error;
pub mod namespace;
pub mod results;
pub mod sparql;
pub mod triples;
pub mod wql;

pub use error::{Error, Result};
pub use namespace::{NamespaceMap, build_namespace_map};
pub use results::{QueryResults, ResultKind, decode_results};
pub use sparql::{
  SelectResults, TriplePattern, generate_sparql_results, generate_sparql_select,
  parse_sparql_results,
};
pub use triples::{
  ParsedGraph, Role, generate_bnode_map, generate_triple_list,
  generate_triple_xml, parse_bnode_map, parse_graph, parse_triples,
};
pub use wql::{
  WqlQuery, generate_boolean, generate_node_list, generate_wql, parse_boolean,
  parse_node_list, parse_wql,
};

/// Strip an XML namespace prefix from an element or attribute name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
  match name.iter().rposition(|&b| b == b':') {
    Some(pos) => &name[pos + 1..],
    None => name,
  }
}
