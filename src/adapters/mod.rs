//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                | Connects to                        |
//! |-------------|---------------------------|------------------------------------|
//! | `hardware`  | SensorPort, ActuatorPort  | GPIO, SPI ADC, contactor coils     |
//! |             | BroadcastPort, ClockPort  | CAN bus, SIM100 isolation monitor  |
//! | `can_sink`  | EventSink                 | Status record on CAN id `0x48A`    |
//! | `log_sink`  | EventSink                 | `log` facade                       |
//! | `time`      | ClockPort                 | `std::time::Instant`, manual clock |
//! | `sim`       | embedded-hal, embedded-can| Simulated pack, bus and monitor    |

pub mod can_sink;
pub mod hardware;
pub mod log_sink;
pub mod sim;
pub mod time;
