//! Outbound email.
//!
//! Delivery itself is an external collaborator; this transport formats
//! the messages the server sends and logs them. Swapping in a real SMTP
//! relay only touches this module.

pub struct Mailer {
    from: String,
}

impl Mailer {
    pub fn new(from: impl Into<String>) -> Mailer {
        Mailer { from: from.into() }
    }

    pub fn send(&self, to: &str, subject: &str, body: &str) {
        tracing::info!(from = %self.from, %to, %subject, %body, "outbound email");
    }

    pub fn send_verification(&self, to: &str, token: &str) {
        self.send(
            to,
            "Kasupel email verification",
            &format!("Here is the code to verify your email address: {token}."),
        );
    }
}
