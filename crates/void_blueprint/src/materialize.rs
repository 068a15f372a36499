//! Materialization
//!
//! A resolved graph is first staged: every declared object plus every
//! missing intermediate namespace node becomes an `ObjectSpec`, ordered so
//! parents precede children, with namespace-valued attributes resolved to
//! staged handles. The host then creates the whole configuration in one
//! call, after which post-instantiate callbacks run against the realized
//! objects.

use crate::callback::run_callbacks;
use crate::error::InstantiateError;
use crate::graph::ResolvedGraph;
use crate::host::{AttrValue, Host, HostError, ObjectId, ObjectRef, ObjectSpec, StagedHandle};
use std::collections::{BTreeMap, BTreeSet};
use void_core::Namespace;

/// Fully qualified host-side name of a graph namespace
pub fn qualified_name(prefix: &str, namespace: &Namespace) -> String {
    let prefix = prefix.trim_end_matches('.');
    match (prefix.is_empty(), namespace.is_root()) {
        (true, _) => namespace.as_str().to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}.{}", prefix, namespace.as_str()),
    }
}

/// Resolve a namespace reference
///
/// `lookup` yields the reference for a known node and whether the node was
/// explicitly declared. An unknown namespace below a declared object is a
/// port of that object; anything else is passed through as external.
pub(crate) fn resolve_reference(
    target: &Namespace,
    lookup: impl Fn(&Namespace) -> Option<(ObjectRef, bool)>,
    prefix: &str,
) -> ObjectRef {
    if let Some((found, _)) = lookup(target) {
        return found;
    }
    for ancestor in target.ancestors().skip(1) {
        if let Some((base, true)) = lookup(&ancestor) {
            let path = target
                .relative_to(&ancestor)
                .map(|rel| rel.components().map(str::to_string).collect())
                .unwrap_or_default();
            return ObjectRef::Port {
                base: Box::new(base),
                path,
            };
        }
    }
    log::warn!(
        "Reference to '{}' does not name an object in this graph; passing it through",
        target
    );
    ObjectRef::External(qualified_name(prefix, target))
}

/// A configuration ready to hand to the host
#[derive(Debug, Clone)]
pub struct StagedGraph {
    prefix: String,
    nodes: Vec<Namespace>,
    specs: Vec<ObjectSpec>,
    declared: BTreeSet<Namespace>,
}

impl StagedGraph {
    /// Stage a resolved graph under `name_prefix`
    pub fn build(graph: &ResolvedGraph, name_prefix: &str) -> Self {
        let mut layout: BTreeMap<Namespace, bool> = graph
            .objects()
            .keys()
            .map(|name| (name.clone(), true))
            .collect();

        let anchors: Vec<Namespace> = graph
            .objects()
            .keys()
            .chain(graph.expanded().keys())
            .cloned()
            .collect();
        for anchor in anchors {
            for ancestor in anchor.ancestors() {
                if ancestor.is_root() && name_prefix.is_empty() {
                    continue;
                }
                layout.entry(ancestor).or_insert(false);
            }
        }

        let nodes: Vec<Namespace> = layout.keys().cloned().collect();
        let handles: BTreeMap<&Namespace, StagedHandle> = nodes
            .iter()
            .enumerate()
            .map(|(index, ns)| (ns, StagedHandle(index)))
            .collect();
        let lookup = |ns: &Namespace| {
            handles
                .get(ns)
                .map(|handle| (ObjectRef::Staged(*handle), layout.get(ns).copied().unwrap_or(false)))
        };

        let mut specs = Vec::with_capacity(nodes.len());
        for ns in &nodes {
            let spec = match graph.object(ns) {
                Some(object) => ObjectSpec {
                    name: qualified_name(name_prefix, ns),
                    class: object.class.clone(),
                    attrs: object
                        .attrs
                        .iter()
                        .map(|(attr, value)| {
                            let mut resolve =
                                |target: &Namespace| resolve_reference(target, lookup, name_prefix);
                            (attr.clone(), AttrValue::from_value(value, &mut resolve))
                        })
                        .collect(),
                    blueprint: graph.blueprint_at(ns).map(str::to_string),
                    synthesized: false,
                },
                None => ObjectSpec {
                    name: qualified_name(name_prefix, ns),
                    class: graph.namespace_class().to_string(),
                    attrs: BTreeMap::new(),
                    blueprint: graph.blueprint_at(ns).map(str::to_string),
                    synthesized: true,
                },
            };
            specs.push(spec);
        }

        let declared = layout
            .into_iter()
            .filter(|(_, declared)| *declared)
            .map(|(ns, _)| ns)
            .collect();

        Self {
            prefix: name_prefix.to_string(),
            nodes,
            specs,
            declared,
        }
    }

    /// Specs in creation order
    pub fn specs(&self) -> &[ObjectSpec] {
        &self.specs
    }

    /// Staged handle of a node
    pub fn handle(&self, namespace: &Namespace) -> Option<StagedHandle> {
        self.nodes.binary_search(namespace).ok().map(StagedHandle)
    }

    /// Spec of a node
    pub fn spec(&self, namespace: &Namespace) -> Option<&ObjectSpec> {
        self.handle(namespace).map(|handle| &self.specs[handle.0])
    }

    /// Number of staged objects
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of synthesized namespace nodes
    pub fn synthesized(&self) -> usize {
        self.specs.iter().filter(|spec| spec.synthesized).count()
    }

    fn realize(self, ids: Vec<ObjectId>, tags: BTreeMap<Namespace, String>) -> Instantiation {
        let names = self
            .nodes
            .iter()
            .zip(&self.specs)
            .map(|(ns, spec)| (ns.clone(), spec.name.clone()))
            .collect();
        let objects = self.nodes.into_iter().zip(ids.iter().copied()).collect();
        Instantiation {
            prefix: self.prefix,
            ids,
            objects,
            names,
            declared: self.declared,
            tags,
        }
    }
}

/// The objects created for one resolved graph
#[derive(Debug, Clone)]
pub struct Instantiation {
    prefix: String,
    ids: Vec<ObjectId>,
    objects: BTreeMap<Namespace, ObjectId>,
    names: BTreeMap<Namespace, String>,
    declared: BTreeSet<Namespace>,
    tags: BTreeMap<Namespace, String>,
}

impl Instantiation {
    /// Realized handle of a node
    pub fn get(&self, namespace: &Namespace) -> Option<ObjectId> {
        self.objects.get(namespace).copied()
    }

    /// Host-side name of a node
    pub fn name(&self, namespace: &Namespace) -> Option<&str> {
        self.names.get(namespace).map(String::as_str)
    }

    /// Blueprint expanded at a node
    ///
    /// Also answers for the root, which has no object of its own when the
    /// graph is instantiated without a name prefix.
    pub fn blueprint_at(&self, namespace: &Namespace) -> Option<&str> {
        self.tags.get(namespace).map(String::as_str)
    }

    /// Realized handle of a staged handle
    pub fn by_handle(&self, handle: StagedHandle) -> Option<ObjectId> {
        self.ids.get(handle.0).copied()
    }

    /// Resolve a namespace against the realized objects
    pub fn resolve(&self, namespace: &Namespace) -> ObjectRef {
        resolve_reference(
            namespace,
            |ns| {
                self.objects
                    .get(ns)
                    .map(|id| (ObjectRef::Realized(*id), self.declared.contains(ns)))
            },
            &self.prefix,
        )
    }

    /// Iterate over realized nodes
    pub fn iter(&self) -> impl Iterator<Item = (&Namespace, ObjectId)> {
        self.objects.iter().map(|(ns, id)| (ns, *id))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Realize a resolved graph through the host and run its callbacks
///
/// Returns `Rejected` when the host refuses the configuration, in which
/// case no callback runs. Callback failures do not stop later callbacks;
/// they are reported together once the batch has finished.
pub fn instantiate<H: Host>(
    graph: &ResolvedGraph,
    host: &mut H,
    name_prefix: &str,
) -> Result<Instantiation, InstantiateError> {
    let staged = StagedGraph::build(graph, name_prefix);
    log::info!(
        "Materializing {} objects ({} synthesized) from '{}'",
        staged.len(),
        staged.synthesized(),
        graph.blueprint()
    );

    let ids = host.create_configuration(staged.specs()).map_err(|e| {
        log::error!("Host rejected configuration: {}", e);
        InstantiateError::Rejected(e)
    })?;
    if ids.len() != staged.len() {
        return Err(InstantiateError::Rejected(HostError::new(format!(
            "host returned {} handles for {} objects",
            ids.len(),
            staged.len()
        ))));
    }

    let realized = staged.realize(ids, graph.expanded().clone());
    let failures = run_callbacks(graph.callbacks(), host, &realized);
    if failures.is_empty() {
        log::info!("Instantiated {} objects", realized.len());
        Ok(realized)
    } else {
        Err(InstantiateError::Callbacks { failures, realized })
    }
}
