// Share Messages - Per-participant payment request text
// Delivery (native share sheet / clipboard) happens on the client

use crate::engine::Participant;

/// Message for one participant, in the app's house format.
/// Falls back to "the restaurant" when the vendor was not recognized.
pub fn share_message(participant: &Participant, vendor: &str, payment_info: &str) -> String {
    let vendor = if vendor.trim().is_empty() {
        "the restaurant"
    } else {
        vendor
    };

    format!(
        "Hi {}! Your share from {} is PKR {:.2}.\nPay: {}\nThanks!",
        participant.name, vendor, participant.total_amount, payment_info
    )
}

/// All messages at once, separated for forwarding as a single text.
pub fn share_all_message(participants: &[Participant], vendor: &str, payment_info: &str) -> String {
    participants
        .iter()
        .map(|p| share_message(p, vendor, payment_info))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
