//! Plain-text message builders.

use std::fmt::Write;

use super::OutboundEmail;
use crate::domain::aggregates::{Address, ContactMessage, Order, OrderItem};

fn item_lines(items: &[&OrderItem]) -> String {
    let mut out = String::new();
    for i in items {
        let _ = writeln!(out, "- {} ({}) x{} [SKU: {}]", i.product_name, i.variant_name, i.quantity, i.sku);
    }
    out
}

fn address_block(a: &Address) -> String {
    let mut out = format!("{}\n", a.full_name());
    if let Some(company) = &a.company { let _ = writeln!(out, "{company}"); }
    let _ = writeln!(out, "{}", a.address1);
    if let Some(line2) = &a.address2 { let _ = writeln!(out, "{line2}"); }
    let _ = writeln!(out, "{}, {} {}", a.city, a.state, a.postal_code);
    let _ = writeln!(out, "{}", a.country);
    if !a.phone.is_empty() { let _ = writeln!(out, "Phone: {}", a.phone); }
    out
}

pub fn order_confirmation(order: &Order, app_url: &str) -> OutboundEmail {
    let items: Vec<&OrderItem> = order.items().iter().collect();
    let mut text = format!("Thank you for your order!\n\nOrder #{}\n\n{}\n", order.order_number(), item_lines(&items));
    let _ = writeln!(text, "Subtotal: ${:.2}", order.subtotal());
    if !order.discount().is_zero() { let _ = writeln!(text, "Discount: -${:.2}", order.discount()); }
    let _ = writeln!(text, "Shipping: ${:.2}", order.shipping());
    if !order.tax().is_zero() { let _ = writeln!(text, "Tax: ${:.2}", order.tax()); }
    let _ = writeln!(text, "Total: ${:.2} {}", order.total(), order.currency());
    let _ = write!(text, "\nShipping to:\n{}\nTrack your order at {}/track-order", address_block(order.shipping_address()), app_url.trim_end_matches('/'));
    OutboundEmail { to: order.email().to_string(), subject: format!("Order Confirmed! #{}", order.order_number()), text }
}

/// Sent once for the items that just moved into shipped.
pub fn shipping_update(order: &Order, item_indices: &[usize]) -> Option<OutboundEmail> {
    let items: Vec<&OrderItem> = item_indices.iter().filter_map(|&i| order.items().get(i)).collect();
    let first = items.first()?;
    let mut text = format!("Good news! Your order #{} is on its way.\n\n{}", order.order_number(), item_lines(&items));
    if let Some(number) = &first.tracking_number { let _ = writeln!(text, "\nTracking number: {number}"); }
    if let Some(url) = &first.tracking_url { let _ = writeln!(text, "Track it here: {url}"); }
    Some(OutboundEmail { to: order.email().to_string(), subject: format!("Your order has shipped! #{}", order.order_number()), text })
}

/// Asks an admin to place the dropship part of an order by hand.
pub fn dropship_alert(order: &Order, indices: &[usize], admin_email: &str) -> OutboundEmail {
    let items: Vec<&OrderItem> = indices.iter().filter_map(|&i| order.items().get(i)).collect();
    let text = format!(
        "Order #{} requires manual fulfillment through the dropship vendor.\n\nItems to order:\n{}\nShipping address:\n{}\nCustomer email: {}\n\n\
         Once shipped, add the tracking information to the order in the admin dashboard.",
        order.order_number(), item_lines(&items), address_block(order.shipping_address()), order.email(),
    );
    OutboundEmail { to: admin_email.to_string(), subject: format!("New Dropship Order: {}", order.order_number()), text }
}

pub fn contact_alert(message: &ContactMessage, admin_email: &str) -> OutboundEmail {
    let mut text = format!("From: {} <{}>\nSubject: {}\n", message.name, message.email, message.subject);
    if let Some(n) = &message.order_number { let _ = writeln!(text, "Order: {n}"); }
    let _ = write!(text, "\n{}", message.message);
    OutboundEmail { to: admin_email.to_string(), subject: format!("[Contact Form] {} - {}", message.subject, message.name), text }
}
