//! Disjoint-set forest with union by rank and path halving.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Partition labels that do not depend on union order.
    ///
    /// Each element gets the index of the first element of its set, so two
    /// forests that induce the same partition produce the same labels.
    pub fn canonical_labels(&mut self) -> Vec<usize> {
        let n = self.parent.len();
        let mut first_of_root = vec![usize::MAX; n];
        let mut labels = Vec::with_capacity(n);
        for x in 0..n {
            let root = self.find(x);
            if first_of_root[root] == usize::MAX {
                first_of_root[root] = x;
            }
            labels.push(first_of_root[root]);
        }
        labels
    }
}
