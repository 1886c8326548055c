// Troll: a compiler and stack VM for the Troll dice-roll language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

// tvm <file>: load a compiled chunk and run it, printing the result.
// Set TROLL_SEED to an unsigned integer for a reproducible roll.
// Exit codes: 64 usage, 70 runtime error, 74 I/O error.

use std::env;
use std::process;

use troll::codec;
use troll::vm::{Dice, VM};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: tvm <file>");
        process::exit(64);
    }

    let chunk = match codec::load_chunk(&args[1]) {
        Ok(chunk) => chunk,
        Err(_) => {
            eprintln!("Could not open file '{}'.", args[1]);
            process::exit(74);
        }
    };

    let mut dice = match env::var("TROLL_SEED") {
        Ok(seed) => match seed.parse() {
            Ok(seed) => Dice::seeded(seed),
            Err(_) => {
                eprintln!("TROLL_SEED must be an unsigned integer.");
                process::exit(64);
            }
        },
        Err(_) => Dice::new(),
    };

    match VM::new().interpret(&chunk, &mut dice) {
        Ok(value) => println!("{}", value),
        // The VM already reported the failure to stderr.
        Err(_) => process::exit(70),
    }
}
