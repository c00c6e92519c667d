use super::{
    Command, ExtendedFrame, LinkError, Message, StatusFrame, EXTENDED_FRAME_MAX_LEN,
    NOTICE_FRAME_MAX_LEN, REQUEST_EXTENDED, REQUEST_NOTICE, REQUEST_STATUS, STATUS_FRAME_LEN,
};
use crate::hal::I2cBus;
use tracing::{debug, trace};

/// Request/response plumbing to the co-processor
///
/// Stateless apart from the address and the transaction counters. A failed transaction
/// is never retried here, the next poll picks the state up again.
#[derive(Debug, Clone)]
pub struct CoprocessorLink {
    address: u16,
    transactions: u64,
    failures: u64,
}

impl CoprocessorLink {
    pub const DEFAULT_ADDRESS: u16 = 0x43;

    pub fn new(address: u16) -> Self {
        Self {
            address,
            transactions: 0,
            failures: 0,
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// (transactions, failures) since the link was created
    pub fn counters(&self) -> (u64, u64) {
        (self.transactions, self.failures)
    }

    pub fn query_status(&mut self, bus: &mut dyn I2cBus) -> Result<StatusFrame, LinkError> {
        let mut buffer = [0u8; STATUS_FRAME_LEN];
        let frame = self.request(bus, REQUEST_STATUS, &mut buffer)?;
        self.checked(StatusFrame::decode(frame))
    }

    pub fn query_extended(&mut self, bus: &mut dyn I2cBus) -> Result<ExtendedFrame, LinkError> {
        let mut buffer = [0u8; EXTENDED_FRAME_MAX_LEN];
        let frame = self.request(bus, REQUEST_EXTENDED, &mut buffer)?;
        self.checked(ExtendedFrame::decode(frame))
    }

    pub fn query_notice(&mut self, bus: &mut dyn I2cBus) -> Result<Message, LinkError> {
        let mut buffer = [0u8; NOTICE_FRAME_MAX_LEN];
        let frame = self.request(bus, REQUEST_NOTICE, &mut buffer)?;
        self.checked(Message::decode(frame))
    }

    pub fn send(&mut self, bus: &mut dyn I2cBus, command: &Command) -> Result<(), LinkError> {
        let frame = command.encode();
        debug!("Sending {:?} to co-processor: {:02x?}", command, frame);
        self.transactions += 1;
        bus.write(self.address, &frame).map_err(|e| {
            self.failures += 1;
            LinkError::from(e)
        })
    }

    fn request<'a>(
        &mut self,
        bus: &mut dyn I2cBus,
        request: u8,
        buffer: &'a mut [u8],
    ) -> Result<&'a [u8], LinkError> {
        self.transactions += 1;
        match bus.write_read(self.address, &[request], buffer) {
            Ok(received) => {
                let received = received.min(buffer.len());
                trace!(
                    "Request 0x{:02x} answered with {:02x?}",
                    request,
                    &buffer[..received]
                );
                Ok(&buffer[..received])
            }
            Err(e) => {
                self.failures += 1;
                Err(e.into())
            }
        }
    }

    fn checked<T>(&mut self, decoded: Result<T, LinkError>) -> Result<T, LinkError> {
        if decoded.is_err() {
            self.failures += 1;
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::{Controls, Mode};
    use crate::hal::mock::{MockCoprocessor, Reply};
    use crate::hal::BusError;

    #[test]
    fn status_poll_decodes_coprocessor_state() {
        let avr = MockCoprocessor::new();
        avr.update(|s| {
            s.status.mode = Mode::Standby;
            s.status.vbatt = 371;
            s.status.controls = Controls {
                buttons: 1,
                thumb_x: 0,
                thumb_y: 255,
            };
        });
        let mut bus = avr.bus();
        let mut link = CoprocessorLink::new(CoprocessorLink::DEFAULT_ADDRESS);

        let status = link.query_status(&mut bus).unwrap();
        assert_eq!(status.mode, Mode::Standby);
        assert_eq!(status.vbatt, 371);
        assert!(status.controls.is_pressed(0));
        assert_eq!(link.counters(), (1, 0));
    }

    #[test]
    fn failures_are_counted_not_retried() {
        let avr = MockCoprocessor::new();
        avr.push_reply(Reply::Fail(BusError::Nack { address: 0x43 }));
        avr.push_reply(Reply::Raw(vec![0xa1, 4, 0, 0]));
        let mut bus = avr.bus();
        let mut link = CoprocessorLink::new(CoprocessorLink::DEFAULT_ADDRESS);

        assert_eq!(
            link.query_status(&mut bus),
            Err(LinkError::Bus(BusError::Nack { address: 0x43 }))
        );
        assert!(matches!(
            link.query_status(&mut bus),
            Err(LinkError::BadLength { .. })
        ));
        assert_eq!(link.counters(), (2, 2));
        assert_eq!(avr.requests(), vec![0x01, 0x01]);
    }

    #[test]
    fn commands_are_plain_writes() {
        let avr = MockCoprocessor::new();
        let mut bus = avr.bus();
        let mut link = CoprocessorLink::new(CoprocessorLink::DEFAULT_ADDRESS);

        link.send(&mut bus, &Command::SetBrightness { value: 200 })
            .unwrap();
        link.send(&mut bus, &Command::EnterRepairMode).unwrap();
        assert_eq!(
            avr.commands(),
            vec![Command::SetBrightness { value: 200 }, Command::EnterRepairMode]
        );
    }

    #[test]
    fn pending_notice_is_delivered_once() {
        let avr = MockCoprocessor::new();
        avr.notify(Message::RumblerOk);
        let mut bus = avr.bus();
        let mut link = CoprocessorLink::new(CoprocessorLink::DEFAULT_ADDRESS);

        assert!(link.query_status(&mut bus).unwrap().notice_pending);
        assert_eq!(link.query_notice(&mut bus), Ok(Message::RumblerOk));
        assert!(!link.query_status(&mut bus).unwrap().notice_pending);
    }
}
