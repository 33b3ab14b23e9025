//! Evaluating TMVA boosted decision trees from their XML weight files.
//!
//! Only `Method="BDT::..."` files without input variable transformations
//! are accepted. Cut comparisons happen in single precision, like the
//! TMVA reader, which hands the trees `float` inputs.

use std::path::Path;

use roxmltree::Node;

use crate::error::{NtupleError, Result};

#[derive(Debug, Clone, PartialEq)]
struct TreeNode {
    var: usize,
    cut: f32,
    cut_type: bool,
    response: f64,
    purity: f64,
    node_type: i32,
    left: Option<usize>,
    right: Option<usize>,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DecisionTree {
    boost_weight: f64,
    root: usize,
}

/// How tree outputs are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoostType {
    /// Gradient boosting: `2/(1+exp(-2 Σ res)) - 1`.
    Grad,
    /// Any weighted-average scheme (`AdaBoost`, `Bagging`, ...), by name.
    Weighted(String),
}

/// A BDT forest read from a TMVA weight file.
#[derive(Debug, Clone, PartialEq)]
pub struct TmvaBdt {
    variables: Vec<String>,
    boost_type: BoostType,
    use_yes_no_leaf: bool,
    trees: Vec<DecisionTree>,
    nodes: Vec<TreeNode>,
}

impl TmvaBdt {
    /// Read and parse a weight file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_xml(&text)
            .map_err(|e| NtupleError::Mva(format!("{}: {e}", path.display())))
    }

    /// Parse weight-file XML.
    pub fn from_xml(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        let method = root.attribute("Method").unwrap_or_default();
        if !method.starts_with("BDT") {
            return Err(NtupleError::Mva(format!("method '{method}' is not a BDT")));
        }

        let mut boost_type = BoostType::Weighted("AdaBoost".into());
        let mut use_yes_no_leaf = true;
        if let Some(options) = child(root, "Options") {
            for opt in options.children().filter(|n| n.has_tag_name("Option")) {
                let value = opt.text().unwrap_or_default().trim();
                match opt.attribute("name") {
                    Some("BoostType") if value == "Grad" => boost_type = BoostType::Grad,
                    Some("BoostType") => boost_type = BoostType::Weighted(value.to_string()),
                    Some("UseYesNoLeaf") => use_yes_no_leaf = parse_bool(value),
                    _ => {}
                }
            }
        }

        if let Some(tr) = child(root, "Transformations") {
            let n: usize = attr(tr, "NTransformations").unwrap_or(0);
            if n != 0 {
                return Err(NtupleError::Mva(format!(
                    "{n} input transformation(s) declared, none are supported"
                )));
            }
        }

        let variables: Vec<String> = child(root, "Variables")
            .ok_or_else(|| NtupleError::Mva("no <Variables> element".into()))?
            .children()
            .filter(|n| n.has_tag_name("Variable"))
            .map(|v| {
                v.attribute("Expression")
                    .or_else(|| v.attribute("Label"))
                    .map(String::from)
                    .ok_or_else(|| NtupleError::Mva("variable without Expression".into()))
            })
            .collect::<Result<_>>()?;

        let weights =
            child(root, "Weights").ok_or_else(|| NtupleError::Mva("no <Weights> element".into()))?;
        let mut nodes = Vec::new();
        let mut trees = Vec::new();
        for bt in weights.children().filter(|n| n.has_tag_name("BinaryTree")) {
            let boost_weight: f64 = attr(bt, "boostWeight").unwrap_or(1.0);
            let top = child(bt, "Node").ok_or_else(|| NtupleError::Mva("empty BinaryTree".into()))?;
            let root = parse_node(top, &mut nodes, variables.len())?;
            trees.push(DecisionTree { boost_weight, root });
        }
        if trees.is_empty() {
            return Err(NtupleError::Mva("forest has no trees".into()));
        }
        log::debug!(
            "loaded BDT with {} trees, {} nodes, {} variables",
            trees.len(),
            nodes.len(),
            variables.len()
        );

        Ok(Self { variables, boost_type, use_yes_no_leaf, trees, nodes })
    }

    /// Input variable expressions, in evaluation order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of trees in the forest.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Boosting scheme.
    pub fn boost_type(&self) -> &BoostType {
        &self.boost_type
    }

    /// Fail unless `names` are exactly the trained variables, in order.
    pub fn check_variables(&self, names: &[String]) -> Result<()> {
        if names != self.variables.as_slice() {
            return Err(NtupleError::Mva(format!(
                "variables {names:?} do not match the weight file {:?}",
                self.variables
            )));
        }
        Ok(())
    }

    fn leaf(&self, tree: &DecisionTree, x: &[f32]) -> &TreeNode {
        let mut node = &self.nodes[tree.root];
        while !node.is_leaf() {
            let value = x.get(node.var).copied().unwrap_or(0.0);
            let goes_right = (value >= node.cut) == node.cut_type;
            let next = if goes_right { node.right } else { node.left };
            match next {
                Some(i) => node = &self.nodes[i],
                None => break,
            }
        }
        node
    }

    /// Classifier output for one event. `x` follows [`variables`](Self::variables).
    pub fn evaluate(&self, x: &[f32]) -> f64 {
        match self.boost_type {
            BoostType::Grad => {
                let sum: f64 = self.trees.iter().map(|t| self.leaf(t, x).response).sum();
                2.0 / (1.0 + (-2.0 * sum).exp()) - 1.0
            }
            BoostType::Weighted(_) => {
                let mut num = 0.0;
                let mut norm = 0.0;
                for t in &self.trees {
                    let leaf = self.leaf(t, x);
                    let value =
                        if self.use_yes_no_leaf { f64::from(leaf.node_type) } else { leaf.purity };
                    num += t.boost_weight * value;
                    norm += t.boost_weight;
                }
                if norm > f64::EPSILON { num / norm } else { 0.0 }
            }
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn attr<T: std::str::FromStr>(node: Node, name: &str) -> Option<T> {
    node.attribute(name).and_then(|v| v.trim().parse().ok())
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "t")
}

fn parse_node(node: Node, nodes: &mut Vec<TreeNode>, n_vars: usize) -> Result<usize> {
    let ivar: i64 = attr(node, "IVar").unwrap_or(-1);
    let cut: f64 = attr(node, "Cut").unwrap_or(0.0);
    let parsed = TreeNode {
        var: usize::try_from(ivar).unwrap_or(usize::MAX),
        cut: cut as f32,
        cut_type: attr::<i64>(node, "cType").unwrap_or(1) != 0,
        response: attr(node, "res").unwrap_or(0.0),
        purity: attr(node, "purity").unwrap_or(0.0),
        node_type: attr(node, "nType").unwrap_or(0),
        left: None,
        right: None,
    };
    let idx = nodes.len();
    nodes.push(parsed);

    let mut left = None;
    let mut right = None;
    for c in node.children().filter(|n| n.has_tag_name("Node")) {
        let child_idx = parse_node(c, nodes, n_vars)?;
        match c.attribute("pos") {
            Some("l") => left = Some(child_idx),
            Some("r") => right = Some(child_idx),
            other => {
                return Err(NtupleError::Mva(format!("node with unknown position {other:?}")));
            }
        }
    }
    if left.is_some() != right.is_some() {
        return Err(NtupleError::Mva("internal node with a single child".into()));
    }
    if left.is_some() && nodes[idx].var >= n_vars {
        return Err(NtupleError::Mva(format!("cut on variable {ivar} of {n_vars}")));
    }
    nodes[idx].left = left;
    nodes[idx].right = right;
    Ok(idx)
}
