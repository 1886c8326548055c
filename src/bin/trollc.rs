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

// trollc <file>: compile a Troll expression to a bytecode chunk on disk.
// Exit codes: 64 usage, 65 compile error, 74 I/O error.

use std::env;
use std::fs;
use std::process;

use troll::chunk::Chunk;
use troll::codec;
use troll::compiler;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: trollc <file>");
        process::exit(64);
    }
    let path = &args[1];

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file '{}'.", path);
            process::exit(74);
        }
    };

    let mut chunk = Chunk::new();
    if !compiler::compile(&source, &mut chunk) {
        process::exit(65);
    }

    // Historical naming convention: the output path is the input path with
    // its final character replaced by 'g'.
    let mut out_path = path.clone();
    out_path.pop();
    out_path.push('g');

    if let Err(e) = codec::save_chunk(&chunk, &out_path) {
        eprintln!("Could not write file '{}': {}", out_path, e);
        process::exit(74);
    }
}
