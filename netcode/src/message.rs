//! A pending/sent/acknowledged reliable datagram (spec §3 "Message (reliable)") and the ordered,
//! sequence-searchable queue that holds them (spec §3 "MessageQueue").

use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageState {
    Pending,
    Sent,
    Done,
}

/// One reliable datagram in flight. `packet` is the fully-framed datagram body (command byte,
/// sequence number, payload) ready to hand to the socket verbatim on (re)transmit.
#[derive(Debug, Clone)]
pub struct Message {
    pub sequence: u16,
    pub packet: Vec<u8>,
    pub state: MessageState,
    pub seconds_since_sent: f32,
    /// Number of retransmits since this message was first sent. Used to enforce the additive
    /// `maxReliableRetries` tunable (spec §9 open question); `0` retries means never sent yet.
    pub retries: u32,
}

impl Message {
    pub fn new(sequence: u16, packet: Vec<u8>) -> Message {
        Message { sequence, packet, state: MessageState::Pending, seconds_since_sent: 0.0, retries: 0 }
    }

    pub fn mark_sent(&mut self) {
        self.state = MessageState::Sent;
        self.seconds_since_sent = 0.0;
    }

    pub fn mark_retransmitted(&mut self) {
        self.seconds_since_sent = 0.0;
        self.retries += 1;
    }

    pub fn age(&mut self, elapsed: Duration) {
        self.seconds_since_sent += elapsed.as_secs_f32();
    }
}

/// Ordered collection of reliable messages, searchable by sequence number. Used on both the send
/// side (pending/sent, awaiting ack) and the receive side (out-of-order buffering).
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: Vec<Message>,
}

impl MessageQueue {
    pub fn new() -> MessageQueue {
        MessageQueue { messages: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn front(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn front_mut(&mut self) -> Option<&mut Message> {
        self.messages.first_mut()
    }

    pub fn pop_front(&mut self) -> Option<Message> {
        if self.messages.is_empty() {
            None
        } else {
            Some(self.messages.remove(0))
        }
    }

    pub fn find_by_sequence(&self, sequence: u16) -> Option<&Message> {
        self.messages.iter().find(|m| m.sequence == sequence)
    }

    pub fn find_by_sequence_mut(&mut self, sequence: u16) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.sequence == sequence)
    }

    pub fn remove_by_sequence(&mut self, sequence: u16) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.sequence == sequence)?;
        Some(self.messages.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_message_by_sequence() {
        let mut queue = MessageQueue::new();
        queue.push(Message::new(1, vec![1]));
        queue.push(Message::new(2, vec![2]));
        assert_eq!(queue.find_by_sequence(2).unwrap().packet, vec![2]);
        assert!(queue.find_by_sequence(3).is_none());
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut queue = MessageQueue::new();
        queue.push(Message::new(1, vec![]));
        queue.push(Message::new(2, vec![]));
        assert_eq!(queue.pop_front().unwrap().sequence, 1);
        assert_eq!(queue.pop_front().unwrap().sequence, 2);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn ages_accumulate() {
        let mut message = Message::new(0, vec![]);
        message.mark_sent();
        message.age(Duration::from_millis(500));
        message.age(Duration::from_millis(500));
        assert!((message.seconds_since_sent - 1.0).abs() < 1e-6);
    }
}
