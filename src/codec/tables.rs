//! Per-version interning tables.
//!
//! Class and object tables are out-of-band agreements between both peers:
//! a string that appears in a table is replaced on the wire by a 3-byte
//! reference instead of its full encoding. Protocol versions 1/2 and 3
//! each pin their own pair of tables; entries are append-only so that a
//! V1 reference decodes identically under the V3 tables.

/// A fixed table of well-known strings, referenced by index.
#[derive(Debug)]
pub struct StringTable {
    entries: &'static [&'static str],
}

impl StringTable {
    /// Look up the index of a string, if it is in the table.
    pub fn index_of(&self, s: &str) -> Option<u8> {
        self.entries.iter().position(|e| *e == s).map(|i| i as u8)
    }

    /// Resolve a reference index back to its string.
    pub fn get(&self, index: u8) -> Option<&'static str> {
        self.entries.get(usize::from(index)).copied()
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Class table for protocol versions 1 and 2: field names of the locator
/// graphs.
pub static V1_CLASS_TABLE: StringTable = StringTable {
    entries: &[
        "appName",
        "moduleName",
        "beanName",
        "distinctName",
        "sessionId",
        "affinity",
    ],
};

/// Class table for protocol version 3: V1 plus the method-locator fields.
pub static V3_CLASS_TABLE: StringTable = StringTable {
    entries: &[
        "appName",
        "moduleName",
        "beanName",
        "distinctName",
        "sessionId",
        "affinity",
        "methodName",
        "parameterTypes",
    ],
};

/// Object table for protocol versions 1 and 2: reserved attachment keys.
pub static V1_OBJECT_TABLE: StringTable = StringTable {
    entries: &[
        "jboss.private.attachments",
        "jboss.transaction.id",
        "jboss.transaction.private-data",
    ],
};

/// Object table for protocol version 3: V1 plus response-side keys.
pub static V3_OBJECT_TABLE: StringTable = StringTable {
    entries: &[
        "jboss.private.attachments",
        "jboss.transaction.id",
        "jboss.transaction.private-data",
        "jboss.weak-affinity",
        "jboss.returned.context.data",
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_and_get_are_inverse() {
        for table in [
            &V1_CLASS_TABLE,
            &V3_CLASS_TABLE,
            &V1_OBJECT_TABLE,
            &V3_OBJECT_TABLE,
        ] {
            for i in 0..table.len() as u8 {
                let s = table.get(i).unwrap();
                assert_eq!(table.index_of(s), Some(i));
            }
        }
    }

    #[test]
    fn test_unknown_entries() {
        assert_eq!(V1_OBJECT_TABLE.index_of("not-a-reserved-key"), None);
        assert_eq!(V1_OBJECT_TABLE.get(200), None);
    }

    #[test]
    fn test_v3_tables_extend_v1() {
        // V1 references must resolve identically under the V3 tables.
        for i in 0..V1_OBJECT_TABLE.len() as u8 {
            assert_eq!(V1_OBJECT_TABLE.get(i), V3_OBJECT_TABLE.get(i));
        }
        for i in 0..V1_CLASS_TABLE.len() as u8 {
            assert_eq!(V1_CLASS_TABLE.get(i), V3_CLASS_TABLE.get(i));
        }
    }
}
