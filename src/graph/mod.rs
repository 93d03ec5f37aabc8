/// Find the [Minimum Spanning Arborescence](https://en.wikipedia.org/wiki/Edmonds%27_algorithm) of a directed graph
pub mod arborescence;
