#![no_main]

use libfuzzer_sys::fuzz_target;
use dotprobe::{
    coverage::ExpectedPath,
    protocol::{Deserializable, ExceptionClause, MethodBody},
    session::ExecutionReport,
};

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = MethodBody::from_bytes(data) {
        let _ = body.clauses();
    }
    let _ = ExpectedPath::from_bytes(data);
    let _ = ExecutionReport::from_bytes(data);
    let _ = ExceptionClause::decode_table(data);
});
