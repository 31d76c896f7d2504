/// Closed mapping from a location tag to the regional queue that serves it.
///
/// Tags match exactly (case-sensitive). Order is preserved so queues are
/// created and reported in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTable {
    entries: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub tag: String,
    pub queue_name: String,
}

impl RegionTable {
    pub fn new(entries: Vec<Region>) -> Result<Self, RegionError> {
        if entries.is_empty() {
            return Err(RegionError::Empty);
        }
        for (i, region) in entries.iter().enumerate() {
            if region.tag.is_empty() || region.queue_name.is_empty() {
                return Err(RegionError::Malformed(format!("{}={}", region.tag, region.queue_name)));
            }
            if entries[..i].iter().any(|r| r.tag == region.tag) {
                return Err(RegionError::DuplicateTag(region.tag.clone()));
            }
            if entries[..i].iter().any(|r| r.queue_name == region.queue_name) {
                return Err(RegionError::DuplicateQueue(region.queue_name.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Parse `USA=usaQueue,Europe=europeQueue` style definitions.
    pub fn parse(spec: &str) -> Result<Self, RegionError> {
        let entries = spec
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (tag, queue) = pair
                    .split_once('=')
                    .ok_or_else(|| RegionError::Malformed(pair.to_string()))?;
                Ok(Region {
                    tag: tag.trim().to_string(),
                    queue_name: queue.trim().to_string(),
                })
            })
            .collect::<Result<Vec<_>, RegionError>>()?;
        Self::new(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("region table is empty")]
    Empty,

    #[error("malformed region entry: {0}")]
    Malformed(String),

    #[error("duplicate region tag: {0}")]
    DuplicateTag(String),

    #[error("two regions share queue: {0}")]
    DuplicateQueue(String),
}
