//! Built-in HTML email templates.
//!
//! Small inline-styled fragments; content escaping is the only logic.

use super::EmailMessage;

const WRAPPER_STYLE: &str = "font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,'Helvetica Neue',Ubuntu,sans-serif;padding:20px;line-height:1.5";
const PANEL_STYLE: &str = "padding:20px;background-color:#f4f4f5;border-radius:5px;border:1px solid #e2e8f0;margin:20px 0";

/// Sent from the webhook handler when a checkout session completes.
pub fn order_confirmation(to: &str, name: &str, order_id: &str, service_name: &str) -> EmailMessage {
    let body = format!(
        "<div style=\"{WRAPPER_STYLE}\">\
         <h1>Hi {},</h1>\
         <p>Thank you for your order! We've successfully received it and are ready to get started.</p>\
         <div style=\"{PANEL_STYLE}\">\
         <p><strong>Service:</strong> {}</p>\
         <p><strong>Order ID:</strong> {}</p>\
         </div>\
         <p>You can track the status of your order at any time by logging into your account dashboard.</p>\
         </div>",
        escape(name),
        escape(service_name),
        escape(order_id),
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Your Order is Confirmed!".to_string(),
        html: body,
    }
}

/// Sent from the capture handler after funds are captured.
pub fn payment_confirmation(
    to: &str,
    name: &str,
    order_id: &str,
    service_name: &str,
) -> EmailMessage {
    let body = format!(
        "<div style=\"{WRAPPER_STYLE}\">\
         <h1>Hi {},</h1>\
         <p>Your payment has been received and your order is now complete.</p>\
         <div style=\"{PANEL_STYLE}\">\
         <p><strong>Service:</strong> {}</p>\
         <p><strong>Order ID:</strong> {}</p>\
         </div>\
         <p>Thank you for working with us.</p>\
         </div>",
        escape(name),
        escape(service_name),
        escape(order_id),
    );
    EmailMessage {
        to: to.to_string(),
        subject: "Payment Successful: Your Order is Complete!".to_string(),
        html: body,
    }
}

/// Sent to the site owner for contact-form enquiries and new quote
/// submissions; the body is the already-formatted free text.
pub fn owner_notification(to: &str, subject: &str, name: &str, email: &str, body: &str) -> EmailMessage {
    let html = format!(
        "<div style=\"{WRAPPER_STYLE}\">\
         <p><strong>From:</strong> {} &lt;{}&gt;</p>\
         <pre style=\"white-space:pre-wrap;font-family:inherit\">{}</pre>\
         </div>",
        escape(name),
        escape(email),
        escape(body),
    );
    EmailMessage {
        to: to.to_string(),
        subject: subject.to_string(),
        html,
    }
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
