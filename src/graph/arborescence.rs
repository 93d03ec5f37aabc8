use rayon::prelude::*;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::debug;

use crate::{matrix::DistanceMatrix, Error, Result};

/// Directed, weighted edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

/// Directed spanning tree in which every vertex except the root has exactly one incoming edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Arborescence {
    root: usize,
    /// Sorted by tail, then head
    edges: Vec<Edge>,
    children: Vec<Vec<usize>>,
}

impl Arborescence {
    fn new(root: usize, mut edges: Vec<Edge>) -> Self {
        edges.sort_by_key(|edge| (edge.from, edge.to));
        let size = edges
            .iter()
            .map(|edge| edge.from.max(edge.to) + 1)
            .fold(root + 1, usize::max);
        let mut children = vec![vec![]; size];
        for edge in &edges {
            children[edge.from].push(edge.to);
        }
        Self {
            root,
            edges,
            children,
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn weight(&self) -> f64 {
        self.edges.iter().map(|edge| edge.weight).sum()
    }

    /// Heads of the tree edges leaving `vertex`, in ascending order.
    pub fn children(&self, vertex: usize) -> &[usize] {
        self.children
            .get(vertex)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, from: usize, to: usize) -> bool {
        self.children(from).binary_search(&to).is_ok()
    }

    pub fn parent(&self, vertex: usize) -> Option<usize> {
        self.edges
            .iter()
            .find(|edge| edge.to == vertex)
            .map(|edge| edge.from)
    }
}

/// Compute the minimum spanning arborescence rooted at `root` with the Chu-Liu/Edmonds algorithm in O(VE) time.
///
/// Edges into the root, self loops and NaN-weighted edges are ignored. When a vertex has
/// several cheapest incoming edges, the one listed first in `edges` wins. For
/// [DistanceMatrix::edges] that is the one with the lowest source vertex.
///
/// <https://en.wikipedia.org/wiki/Edmonds%27_algorithm>
pub fn minimum_arborescence(vertices: &[usize], edges: &[Edge], root: usize) -> Result<Arborescence> {
    let vertex_set: HashSet<usize> = vertices.iter().copied().collect();
    if !vertex_set.contains(&root) {
        return Err(Error::UnknownVertex { vertex: root });
    }
    if let Some(edge) = edges
        .iter()
        .find(|edge| !vertex_set.contains(&edge.from) || !vertex_set.contains(&edge.to))
    {
        let vertex = if vertex_set.contains(&edge.from) {
            edge.to
        } else {
            edge.from
        };
        return Err(Error::UnknownVertex { vertex });
    }
    if let Some(vertex) = first_unreachable(vertices, edges, root) {
        return Err(Error::Unreachable { vertex, root });
    }

    let next_id = vertices.iter().max().map_or(0, |max| max + 1);
    let chosen = contract(vertices, edges, root, next_id)?;
    Ok(Arborescence::new(
        root,
        chosen.into_iter().map(|id| edges[id]).collect(),
    ))
}

fn is_candidate(edge: &Edge, root: usize) -> bool {
    edge.to != root && edge.from != edge.to && !edge.weight.is_nan()
}

fn first_unreachable(vertices: &[usize], edges: &[Edge], root: usize) -> Option<usize> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::default();
    for edge in edges.iter().filter(|edge| is_candidate(edge, root)) {
        adjacency.entry(edge.from).or_default().push(edge.to);
    }

    let mut reached = HashSet::default();
    reached.insert(root);
    let mut dfs = vec![root];
    while let Some(head) = dfs.pop() {
        for next in adjacency.get(&head).into_iter().flatten() {
            if reached.insert(*next) {
                dfs.push(*next);
            }
        }
    }
    vertices
        .iter()
        .copied()
        .find(|vertex| !reached.contains(vertex))
}

/// Solve one contraction level and return the ids (indices into `edges`) of the chosen edges.
///
/// All vertex ids are below `next_id`, which is the id given to the synthetic vertex if a cycle is contracted.
fn contract(vertices: &[usize], edges: &[Edge], root: usize, next_id: usize) -> Result<Vec<usize>> {
    let mut incoming: Vec<Option<usize>> = vec![None; next_id];
    for (id, edge) in edges.iter().enumerate() {
        if !is_candidate(edge, root) {
            continue;
        }
        match incoming[edge.to] {
            Some(cheapest) if edges[cheapest].weight <= edge.weight => {}
            _ => incoming[edge.to] = Some(id),
        }
    }
    if let Some(&vertex) = vertices
        .iter()
        .find(|vertex| **vertex != root && incoming[**vertex].is_none())
    {
        return Err(Error::Unreachable { vertex, root });
    }

    let Some(cycle) = find_cycle(vertices, |vertex| incoming[vertex].map(|id| edges[id].from))
    else {
        return Ok(vertices.iter().filter_map(|vertex| incoming[*vertex]).collect());
    };

    let in_cycle: HashSet<usize> = cycle.iter().copied().collect();
    let synthetic = next_id;
    let mut contracted_vertices = vertices
        .iter()
        .copied()
        .filter(|vertex| !in_cycle.contains(vertex))
        .collect::<Vec<_>>();
    contracted_vertices.push(synthetic);

    // `origin[i]` is the edge of this level that `contracted[i]` stands in for
    let mut contracted: Vec<Edge> = Vec::with_capacity(edges.len());
    let mut origin: Vec<usize> = Vec::with_capacity(edges.len());
    // Slot in `contracted` of the cheapest edge per outside vertex
    let mut entering: HashMap<usize, usize> = HashMap::default();
    let mut leaving: HashMap<usize, usize> = HashMap::default();
    for (id, edge) in edges.iter().enumerate() {
        if !is_candidate(edge, root) {
            continue;
        }
        let (slots, outside, candidate) =
            match (in_cycle.contains(&edge.from), in_cycle.contains(&edge.to)) {
                (false, false) => {
                    contracted.push(*edge);
                    origin.push(id);
                    continue;
                }
                (true, true) => continue,
                (false, true) => {
                    // Entering at `edge.to` replaces the cycle edge already paid for there
                    let paid = incoming[edge.to].map_or(0., |paid| edges[paid].weight);
                    (
                        &mut entering,
                        edge.from,
                        Edge {
                            from: edge.from,
                            to: synthetic,
                            weight: edge.weight - paid,
                        },
                    )
                }
                (true, false) => (
                    &mut leaving,
                    edge.to,
                    Edge {
                        from: synthetic,
                        to: edge.to,
                        weight: edge.weight,
                    },
                ),
            };
        match slots.get(&outside) {
            Some(&slot) if contracted[slot].weight <= candidate.weight => {}
            Some(&slot) => {
                contracted[slot] = candidate;
                origin[slot] = id;
            }
            None => {
                slots.insert(outside, contracted.len());
                contracted.push(candidate);
                origin.push(id);
            }
        }
    }

    let tree = contract(&contracted_vertices, &contracted, root, synthetic + 1)?;

    // Expand: the tree edge entering the synthetic vertex breaks the cycle at its original head
    let mut chosen = Vec::with_capacity(vertices.len());
    let mut entry = None;
    for slot in tree {
        if contracted[slot].to == synthetic {
            entry = Some(edges[origin[slot]].to);
        }
        chosen.push(origin[slot]);
    }
    let entry = entry.ok_or(Error::Unreachable {
        vertex: cycle[0],
        root,
    })?;
    chosen.extend(
        cycle
            .iter()
            .filter(|vertex| **vertex != entry)
            .filter_map(|vertex| incoming[*vertex]),
    );
    Ok(chosen)
}

/// Follow predecessors from every vertex in order and return the vertices of the first cycle met.
fn find_cycle(
    vertices: &[usize],
    predecessor: impl Fn(usize) -> Option<usize>,
) -> Option<Vec<usize>> {
    let mut walk_of: HashMap<usize, usize> = HashMap::default();
    for (walk, start) in vertices.iter().copied().enumerate() {
        let mut vertex = start;
        loop {
            match walk_of.get(&vertex) {
                Some(seen) if *seen == walk => {
                    let mut cycle = vec![vertex];
                    let mut next = predecessor(vertex);
                    while let Some(member) = next.filter(|member| *member != vertex) {
                        cycle.push(member);
                        next = predecessor(member);
                    }
                    return Some(cycle);
                }
                // Joined a path that was already explored
                Some(_) => break,
                None => {}
            }
            walk_of.insert(vertex, walk);
            match predecessor(vertex) {
                Some(parent) => vertex = parent,
                None => break,
            }
        }
    }
    None
}

/// The minimum arborescence of a distance matrix for every choice of root.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    trees: Vec<Arborescence>,
}

impl Forest {
    pub fn build(distances: &DistanceMatrix) -> Result<Self> {
        let vertices = (0..distances.dim()).collect::<Vec<_>>();
        let edges = distances.edges();
        debug!("Computing {} minimum arborescences", vertices.len());
        let trees = vertices
            .par_iter()
            .map(|root| minimum_arborescence(&vertices, &edges, *root))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { trees })
    }

    /// The tree rooted at `root`
    pub fn get(&self, root: usize) -> Option<&Arborescence> {
        self.trees.get(root)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Whether any tree of the forest uses the edge.
    pub fn contains(&self, from: usize, to: usize) -> bool {
        self.trees.iter().any(|tree| tree.contains(from, to))
    }
}
