//! Payment processing

// @CODE:SPEC-PAY-001 impl - charge a card
pub fn charge(amount_cents: u64) -> bool {
    amount_cents > 0
}

// @CODE:SPEC-PAY-001 impl
pub fn refund(amount_cents: u64) -> bool {
    amount_cents > 0
}

// @API:SPEC-PAY-002 impl - webhook endpoint
pub fn webhook() {}
