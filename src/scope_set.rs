use crate::GraphError;

bitflags::bitflags! {
    /// Directions in the scope tree, relative to one scope.
    ///
    /// `ANCESTORS` means grandparent and above, `DESCENDANTS` means
    /// grandchildren and below; combine with `PARENT` or `CHILDREN` to
    /// include the direct neighbours.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ScopeSet: u32 {
        /// The scope itself.
        const SELF = 1;
        /// The direct parent.
        const PARENT = 1 << 1;
        /// Grandparent and above.
        const ANCESTORS = 1 << 2;
        /// Direct children.
        const CHILDREN = 1 << 3;
        /// Grandchildren and below.
        const DESCENDANTS = 1 << 4;
        /// Every index used in a selected scope, not only the requested one.
        const INDICES = 1 << 5;
        /// Evaluate at the tree root only; other scopes share the root's cell.
        const RESULT_TOP = 1 << 6;

        /// Whole subtree, evaluated once at the root.
        const TOP_DOWN = Self::RESULT_TOP.bits()
            | Self::SELF.bits()
            | Self::CHILDREN.bits()
            | Self::DESCENDANTS.bits();
    }
}

impl ScopeSet {
    const UPWARD: ScopeSet = ScopeSet::PARENT.union(ScopeSet::ANCESTORS);
    const DOWNWARD: ScopeSet = ScopeSet::CHILDREN.union(ScopeSet::DESCENDANTS);
    const TRAVERSAL: ScopeSet = ScopeSet::SELF
        .union(ScopeSet::UPWARD)
        .union(ScopeSet::DOWNWARD);

    /// Returns true if the set looks towards the root.
    pub const fn is_ancestors_set(self) -> bool {
        self.intersects(Self::UPWARD)
    }

    /// Returns true if the set looks towards the leaves.
    pub const fn is_descendants_set(self) -> bool {
        self.intersects(Self::DOWNWARD)
    }

    /// Returns true if the set selects at least one direction and does not
    /// mix upward with downward directions.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cell_scope::ScopeSet;
    /// assert!(ScopeSet::SELF.is_valid());
    /// assert!((ScopeSet::PARENT | ScopeSet::ANCESTORS).is_valid());
    /// assert!(!(ScopeSet::PARENT | ScopeSet::CHILDREN).is_valid());
    /// assert!(!ScopeSet::INDICES.is_valid());
    /// ```
    pub const fn is_valid(self) -> bool {
        self.intersects(Self::TRAVERSAL)
            && !(self.is_ancestors_set() && self.is_descendants_set())
    }

    /// Return the set if it is valid.
    pub fn validate(self) -> Result<Self, GraphError> {
        if !self.intersects(Self::TRAVERSAL) {
            Err(GraphError::InvalidScopeSet {
                set: self,
                reason: "no scope direction selected",
            })
        } else if self.is_ancestors_set() && self.is_descendants_set() {
            Err(GraphError::InvalidScopeSet {
                set: self,
                reason: "ancestor and descendant directions are mixed",
            })
        } else {
            Ok(self)
        }
    }
}
