pub mod kmeans;
pub mod tree;

pub use kmeans::{KMeans, KMeansFit};
pub use tree::{CLUSTER_LEVEL, LEAF_LEVEL, TreeBuilder, TreeNode, TreeNodeMetadata};
