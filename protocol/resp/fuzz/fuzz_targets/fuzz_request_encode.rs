#![no_main]

use libfuzzer_sys::fuzz_target;
use protocol_resp::{Request, Value};

fuzz_target!(|data: &[u8]| {
    // Split the input into arguments on NUL bytes.
    let args: Vec<&[u8]> = data.split(|&b| b == 0).collect();
    let request = Request::from_args(&args);

    let mut buf = Vec::new();
    request.encode(&mut buf);
    assert_eq!(buf.len(), request.encoded_len());

    // A request is an array of bulk strings, which the reply parser reads back.
    let (value, consumed) = Value::parse(&buf).unwrap();
    assert_eq!(consumed, buf.len());
    let Value::Array(items) = value else {
        panic!("request did not encode as an array");
    };
    assert_eq!(items.len(), args.len());
    for (item, arg) in items.iter().zip(&args) {
        assert_eq!(item, &Value::BulkString(bytes_of(arg)));
    }
});

fn bytes_of(arg: &[u8]) -> bytes::Bytes {
    bytes::Bytes::copy_from_slice(arg)
}
