//! HTTP/2 flow control
//!
//! This module implements flow control as defined in RFC 7540 Section 5.2.
//!
//! Windows are signed: a SETTINGS_INITIAL_WINDOW_SIZE reduction can push a
//! send window below zero, which only blocks further DATA until
//! WINDOW_UPDATE frames bring it back.

use super::error::{Error, Result};
use super::{DEFAULT_INITIAL_WINDOW_SIZE, MAX_WINDOW_SIZE};

/// Flow control window
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    /// Initial window size
    initial_size: u32,
    /// Current window size (can be negative if over-committed)
    current_size: i64,
}

impl FlowControlWindow {
    /// Create a new flow control window with default size
    pub fn new() -> Self {
        Self::with_initial_size(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Create a new flow control window with specified initial size
    pub fn with_initial_size(initial_size: u32) -> Self {
        FlowControlWindow {
            initial_size,
            current_size: initial_size as i64,
        }
    }

    /// Get current window size
    pub fn size(&self) -> i64 {
        self.current_size
    }

    /// Get initial window size
    pub fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Octets that may be sent right now
    pub fn available(&self) -> usize {
        self.current_size.max(0) as usize
    }

    /// Check if window can send specified amount
    pub fn can_send(&self, amount: usize) -> bool {
        self.current_size >= amount as i64
    }

    /// Take `amount` octets out of the window, refusing to overdraw it
    pub fn reserve(&mut self, amount: usize) -> Result<()> {
        if !self.can_send(amount) {
            return Err(Error::FlowControl(format!(
                "{} octets exceed window of {}",
                amount, self.current_size
            )));
        }
        self.current_size -= amount as i64;
        Ok(())
    }

    /// Increase window size (WINDOW_UPDATE)
    ///
    /// Returns the new window size
    pub fn increase(&mut self, increment: u32) -> Result<i64> {
        let new_size = self.current_size + increment as i64;

        // RFC 7540 Section 6.9.1
        if new_size > MAX_WINDOW_SIZE as i64 {
            return Err(Error::FlowControl(format!(
                "Window size {} exceeds maximum (2^31-1)",
                new_size
            )));
        }

        self.current_size = new_size;
        Ok(self.current_size)
    }

    /// Decrease window size (receiving data)
    pub fn decrease(&mut self, amount: usize) {
        self.current_size -= amount as i64;
    }

    /// Update initial window size from SETTINGS
    ///
    /// The difference to the previous initial size is applied to the current
    /// window, which may leave it negative.
    pub fn update_initial_size(&mut self, new_initial_size: u32) -> Result<()> {
        let diff = new_initial_size as i64 - self.initial_size as i64;
        let new_current = self.current_size + diff;

        if new_current > MAX_WINDOW_SIZE as i64 {
            return Err(Error::FlowControl(format!(
                "New window size {} exceeds maximum (2^31-1)",
                new_current
            )));
        }

        self.initial_size = new_initial_size;
        self.current_size = new_current;

        Ok(())
    }
}

impl Default for FlowControlWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Send and receive windows of a connection or of one stream
#[derive(Debug, Clone, Default)]
pub struct FlowControl {
    /// Send window (outbound data)
    send_window: FlowControlWindow,
    /// Receive window (inbound data)
    recv_window: FlowControlWindow,
}

impl FlowControl {
    /// Create with specified initial window sizes
    pub fn with_initial_sizes(send_size: u32, recv_size: u32) -> Self {
        FlowControl {
            send_window: FlowControlWindow::with_initial_size(send_size),
            recv_window: FlowControlWindow::with_initial_size(recv_size),
        }
    }

    pub fn send_window(&self) -> &FlowControlWindow {
        &self.send_window
    }

    pub fn send_window_mut(&mut self) -> &mut FlowControlWindow {
        &mut self.send_window
    }

    pub fn recv_window(&self) -> &FlowControlWindow {
        &self.recv_window
    }

    /// Octets that may be sent right now
    pub fn available(&self) -> usize {
        self.send_window.available()
    }

    /// Consume send window for outbound data
    pub fn consume_send_window(&mut self, amount: usize) -> Result<()> {
        self.send_window.reserve(amount)
    }

    /// Increase send window from WINDOW_UPDATE
    pub fn increase_send_window(&mut self, increment: u32) -> Result<i64> {
        self.send_window.increase(increment)
    }

    /// Account for inbound data; fails if the peer overran the window
    pub fn consume_recv_window(&mut self, amount: usize) -> Result<()> {
        if amount as i64 > self.recv_window.size() {
            return Err(Error::FlowControl(format!(
                "received {} octets with {} left in window",
                amount,
                self.recv_window.size()
            )));
        }
        self.recv_window.decrease(amount);
        Ok(())
    }

    /// Check if we need to send WINDOW_UPDATE
    ///
    /// Returns the increment that restores the initial window once half of
    /// it or less is left.
    pub fn should_send_window_update(&self) -> Option<u32> {
        let recv_size = self.recv_window.size();
        let initial_size = self.recv_window.initial_size() as i64;

        if recv_size < initial_size && recv_size <= initial_size / 2 {
            Some((initial_size - recv_size) as u32)
        } else {
            None
        }
    }

    /// Record a WINDOW_UPDATE we sent (increases receive window)
    pub fn send_window_update(&mut self, increment: u32) -> Result<i64> {
        self.recv_window.increase(increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_control_window_basic() {
        let window = FlowControlWindow::new();
        assert_eq!(window.size(), DEFAULT_INITIAL_WINDOW_SIZE as i64);
        assert_eq!(window.available(), DEFAULT_INITIAL_WINDOW_SIZE as usize);
    }

    #[test]
    fn test_flow_control_window_reserve() {
        let mut window = FlowControlWindow::with_initial_size(100);

        window.reserve(50).unwrap();
        assert_eq!(window.size(), 50);

        // Beyond budget: rejected, window untouched
        let err = window.reserve(60).unwrap_err();
        assert!(matches!(err, Error::FlowControl(_)));
        assert_eq!(window.size(), 50);

        window.reserve(50).unwrap();
        assert_eq!(window.available(), 0);
    }

    #[test]
    fn test_flow_control_window_increase() {
        let mut window = FlowControlWindow::with_initial_size(100);
        window.reserve(50).unwrap();

        assert_eq!(window.increase(100).unwrap(), 150);
    }

    #[test]
    fn test_flow_control_window_overflow() {
        let mut window = FlowControlWindow::with_initial_size(0x7FFFFFFF);
        assert!(window.increase(1).is_err());
        assert_eq!(window.size(), 0x7FFFFFFF);
    }

    #[test]
    fn test_flow_control_window_update_initial_size() {
        let mut window = FlowControlWindow::with_initial_size(100);
        window.reserve(50).unwrap();

        window.update_initial_size(200).unwrap();
        assert_eq!(window.initial_size(), 200);
        assert_eq!(window.size(), 150); // 50 + 100

        // Shrinking below what is in flight goes negative
        window.update_initial_size(0).unwrap();
        assert_eq!(window.size(), -50);
        assert_eq!(window.available(), 0);
        assert!(!window.can_send(1));

        window.increase(60).unwrap();
        assert_eq!(window.available(), 10);
    }

    #[test]
    fn test_update_initial_size_overflow() {
        let mut window = FlowControlWindow::with_initial_size(65535);
        window.increase(MAX_WINDOW_SIZE - 65535).unwrap();
        assert!(window.update_initial_size(65536).is_err());
    }

    #[test]
    fn test_recv_window_overrun() {
        let mut flow_control = FlowControl::with_initial_sizes(65535, 100);
        flow_control.consume_recv_window(100).unwrap();
        assert!(flow_control.consume_recv_window(1).is_err());
    }

    #[test]
    fn test_should_send_window_update() {
        let mut flow_control = FlowControl::with_initial_sizes(100, 100);

        assert_eq!(flow_control.should_send_window_update(), None);

        flow_control.consume_recv_window(40).unwrap();
        assert_eq!(flow_control.should_send_window_update(), None);

        flow_control.consume_recv_window(20).unwrap();
        assert_eq!(flow_control.should_send_window_update(), Some(60));

        flow_control.send_window_update(60).unwrap();
        assert_eq!(flow_control.recv_window().size(), 100);
        assert_eq!(flow_control.should_send_window_update(), None);
    }

    #[test]
    fn test_window_update_for_tiny_window() {
        let mut flow_control = FlowControl::with_initial_sizes(65535, 1);
        assert_eq!(flow_control.should_send_window_update(), None);

        flow_control.consume_recv_window(1).unwrap();
        assert_eq!(flow_control.should_send_window_update(), Some(1));

        let mut flow_control = FlowControl::with_initial_sizes(65535, 2);
        flow_control.consume_recv_window(1).unwrap();
        assert_eq!(flow_control.should_send_window_update(), Some(1));
    }
}
