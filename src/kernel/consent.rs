use parking_lot::RwLock;

/// Authority that must affirmatively allow transmission. Both checks have to
/// pass before the dispatcher sends anything.
pub trait ConsentGate: Send + Sync {
    fn is_region_checked(&self) -> bool;
    fn is_consent_granted(&self) -> bool;
    /// Headers the collect endpoint needs as proof of consent.
    fn required_headers(&self) -> Vec<(String, String)>;

    fn allows_dispatch(&self) -> bool {
        self.is_region_checked() && self.is_consent_granted()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    Unknown,
    Granted,
    Declined,
}

#[derive(Debug)]
struct ConsentInner {
    region_checked: bool,
    state: ConsentState,
    headers: Vec<(String, String)>,
}

/// In-process consent record, updated by whatever runs the region lookup and
/// the consent prompt.
#[derive(Debug)]
pub struct ConsentTracker {
    inner: RwLock<ConsentInner>,
}

impl Default for ConsentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ConsentInner {
                region_checked: false,
                state: ConsentState::Unknown,
                headers: Vec::new(),
            }),
        }
    }

    /// Region checked and consent granted, no extra headers.
    pub fn granted() -> Self {
        let tracker = Self::new();
        tracker.complete_region_check(Vec::new());
        tracker.grant();
        tracker
    }

    pub fn complete_region_check(&self, headers: Vec<(String, String)>) {
        let mut inner = self.inner.write();
        inner.region_checked = true;
        inner.headers = headers;
    }

    pub fn grant(&self) {
        self.inner.write().state = ConsentState::Granted;
    }

    /// Revocation takes effect from the next flush; a flush already on the
    /// wire is not recalled.
    pub fn decline(&self) {
        self.inner.write().state = ConsentState::Declined;
    }

    pub fn state(&self) -> ConsentState {
        self.inner.read().state
    }
}

impl ConsentGate for ConsentTracker {
    fn is_region_checked(&self) -> bool {
        self.inner.read().region_checked
    }

    fn is_consent_granted(&self) -> bool {
        self.inner.read().state == ConsentState::Granted
    }

    fn required_headers(&self) -> Vec<(String, String)> {
        self.inner.read().headers.clone()
    }
}
